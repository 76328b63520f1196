use std::sync::atomic::{AtomicI64, Ordering};

use log::warn;
use serde_json::Value;

use crate::error::ValidationError;
use crate::model::Favorite;
use crate::utils::{contains_ignore_case, now_millis};

/// Hands out favorite ids: the current unix millisecond, bumped past the
/// previous id when the clock has not advanced.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicI64,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        self.next_after(now_millis())
    }

    fn next_after(&self, now: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Never hand out an id at or below one already stored.
    pub fn observe(&self, favorites: &[Favorite]) {
        if let Some(max) = favorites.iter().map(|f| f.id).max() {
            self.last.fetch_max(max, Ordering::SeqCst);
        }
    }
}

pub fn validate(name: &str, url: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if url.trim().is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    Ok(())
}

/// Reads the stored list; a missing key is an empty list.
pub fn from_value(value: Option<&Value>) -> Option<Vec<Favorite>> {
    match value {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(list) => Some(list),
            Err(e) => {
                warn!("favorites: ignoring malformed list: {}", e);
                None
            }
        },
    }
}

pub fn prepend(list: &[Favorite], favorite: Favorite) -> Vec<Favorite> {
    let mut out = Vec::with_capacity(list.len() + 1);
    out.push(favorite);
    out.extend(list.iter().cloned());
    out
}

pub fn update(
    list: &[Favorite],
    id: i64,
    name: &str,
    url: &str,
) -> Result<Vec<Favorite>, ValidationError> {
    validate(name, url)?;
    if !list.iter().any(|f| f.id == id) {
        return Err(ValidationError::UnknownFavorite(id));
    }

    Ok(list
        .iter()
        .map(|f| {
            if f.id == id {
                Favorite {
                    id,
                    name: name.to_string(),
                    url: url.to_string(),
                }
            } else {
                f.clone()
            }
        })
        .collect())
}

pub fn remove(list: &[Favorite], id: i64) -> Vec<Favorite> {
    list.iter().filter(|f| f.id != id).cloned().collect()
}

/// Entries whose name or url contains `query`, ignoring case.
pub fn search<'a>(list: &'a [Favorite], query: &str) -> Vec<&'a Favorite> {
    list.iter()
        .filter(|f| contains_ignore_case(&f.name, query) || contains_ignore_case(&f.url, query))
        .collect()
}
