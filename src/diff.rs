use std::collections::BTreeMap;

use crate::store::{Changes, Snapshot, StorageChange};

/// Writes `items` over `snapshot` (whole-value replacement per key) and
/// returns the keys whose value actually changed.
pub fn merge_items(snapshot: &mut Snapshot, items: Snapshot) -> Changes {
    let mut changes: Changes = BTreeMap::new();

    for (key, new_value) in items {
        let old_value = snapshot.insert(key.clone(), new_value.clone());
        if old_value.as_ref() == Some(&new_value) {
            continue;
        }
        changes.insert(
            key,
            StorageChange {
                old_value,
                new_value: Some(new_value),
            },
        );
    }

    changes
}

/// Key-level difference between two full snapshots.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Changes {
    let mut changes: Changes = BTreeMap::new();

    for (key, new_value) in new {
        match old.get(key) {
            Some(old_value) if old_value == new_value => {}
            old_value => {
                changes.insert(
                    key.clone(),
                    StorageChange {
                        old_value: old_value.cloned(),
                        new_value: Some(new_value.clone()),
                    },
                );
            }
        }
    }

    for (key, old_value) in old {
        if !new.contains_key(key) {
            changes.insert(
                key.clone(),
                StorageChange {
                    old_value: Some(old_value.clone()),
                    new_value: None,
                },
            );
        }
    }

    changes
}
