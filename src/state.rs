use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::favorites;
use crate::model::{DecodeState, Draft, Favorite, Language, TAB_GENERATE, Theme, keys};
use crate::role::SurfaceRole;
use crate::store::Changes;

/// A part of the view that a notification can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Theme,
    Language,
    ActiveTab,
    Draft,
    Favorites,
    Decode,
}

/// What one surface shows: a mirror of the store, scoped to its role.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub theme: Theme,
    pub language: Language,
    pub active_tab: String,
    pub draft: Draft,
    pub favorites: Vec<Favorite>,
    pub decode: DecodeState,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: Language::default(),
            active_tab: TAB_GENERATE.to_string(),
            draft: Draft::default(),
            favorites: Vec::new(),
            decode: DecodeState::NotStarted,
        }
    }
}

fn parse<T: DeserializeOwned + Default>(key: &str, value: Option<&Value>) -> Option<T> {
    match value {
        None | Some(Value::Null) => Some(T::default()),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("state: ignoring malformed {}: {}", key, e);
                None
            }
        },
    }
}

/// Replaces `slot` only when the value differs. Returns whether it did.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

impl SessionView {
    /// Applies one key's new value. Applying the value the view already holds
    /// is a no-op, which is what makes a surface's own echoes harmless.
    pub fn apply_key(&mut self, role: SurfaceRole, key: &str, value: Option<&Value>) -> Option<Field> {
        let changed = match key {
            keys::THEME => parse(key, value).map(|t| (Field::Theme, replace(&mut self.theme, t))),
            keys::LANGUAGE => {
                parse(key, value).map(|l| (Field::Language, replace(&mut self.language, l)))
            }
            keys::ACTIVE_TAB => {
                let tab = match value {
                    None | Some(Value::Null) => Some(TAB_GENERATE.to_string()),
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                };
                tab.map(|t| (Field::ActiveTab, replace(&mut self.active_tab, t)))
            }
            keys::FAVORITES => {
                favorites::from_value(value).map(|f| (Field::Favorites, replace(&mut self.favorites, f)))
            }
            keys::DECODED_RESULT => {
                DecodeState::from_value(value).map(|d| (Field::Decode, replace(&mut self.decode, d)))
            }
            k if k == role.draft_key() => {
                parse::<Draft>(key, value).map(|d| (Field::Draft, replace(&mut self.draft, d)))
            }
            k if k == role.foreign_draft_key() => {
                debug!("state: {:?} ignores {}", role, k);
                None
            }
            _ => None,
        };

        match changed {
            Some((field, true)) => Some(field),
            _ => None,
        }
    }

    /// Applies a notification; returns the fields that actually changed.
    pub fn apply(&mut self, role: SurfaceRole, changes: &Changes) -> Vec<Field> {
        changes
            .iter()
            .filter_map(|(key, change)| self.apply_key(role, key, change.new_value.as_ref()))
            .collect()
    }

    /// Builds the initial view from a `get` result.
    pub fn hydrate(role: SurfaceRole, stored: &crate::store::Snapshot) -> Self {
        let mut view = Self::default();
        for (key, value) in stored {
            view.apply_key(role, key, Some(value));
        }
        view
    }
}
