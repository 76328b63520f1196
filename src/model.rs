use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Storage keys shared by every surface.
pub mod keys {
    pub const THEME: &str = "theme";
    pub const LANGUAGE: &str = "language";
    pub const ACTIVE_TAB: &str = "activeTab";
    pub const CURRENT_QR_CODE: &str = "currentQRCode";
    pub const POPUP_QR_CODE: &str = "popupQRCode";
    pub const FAVORITES: &str = "favorites";
    pub const DECODED_RESULT: &str = "decodedResult";

    pub const SHARED: &[&str] = &[THEME, LANGUAGE, ACTIVE_TAB, FAVORITES, DECODED_RESULT];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// The concrete colour scheme a surface paints with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

impl Theme {
    pub fn resolve(self, prefers_dark: bool) -> ThemeMode {
        match self {
            Theme::Light => ThemeMode::Light,
            Theme::Dark => ThemeMode::Dark,
            Theme::System if prefers_dark => ThemeMode::Dark,
            Theme::System => ThemeMode::Light,
        }
    }

    /// Flips the currently painted mode; `system` is resolved first.
    pub fn toggled(self, prefers_dark: bool) -> Theme {
        match self.resolve(prefers_dark) {
            ThemeMode::Light => Theme::Dark,
            ThemeMode::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Zh,
}

impl Language {
    pub fn toggled(self) -> Language {
        match self {
            Language::Zh => Language::En,
            Language::En => Language::Zh,
        }
    }
}

pub const TAB_GENERATE: &str = "1";
pub const TAB_DECODE: &str = "2";

/// The name/url pair being edited. Always stored as one document so both
/// fields move together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl Draft {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub name: String,
    pub url: String,
}

/// Outcome of the decoder surface.
///
/// `NotStarted` is the absence of the key, `Cleared` is written when a decode
/// begins, `Decoded` carries the payload (which may itself be empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecodeState {
    #[default]
    NotStarted,
    Cleared,
    Decoded(String),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum StoredDecode {
    Cleared,
    Decoded { text: String },
}

impl DecodeState {
    pub fn to_value(&self) -> Option<Value> {
        match self {
            DecodeState::NotStarted => None,
            DecodeState::Cleared => Some(json!({ "state": "cleared" })),
            DecodeState::Decoded(text) => Some(json!({ "state": "decoded", "text": text })),
        }
    }

    /// Reads the stored document; plain strings from older writers are accepted.
    pub fn from_value(value: Option<&Value>) -> Option<DecodeState> {
        match value {
            None | Some(Value::Null) => Some(DecodeState::NotStarted),
            Some(Value::String(s)) if s.is_empty() => Some(DecodeState::Cleared),
            Some(Value::String(s)) => Some(DecodeState::Decoded(s.clone())),
            Some(other) => match serde_json::from_value::<StoredDecode>(other.clone()) {
                Ok(StoredDecode::Cleared) => Some(DecodeState::Cleared),
                Ok(StoredDecode::Decoded { text }) => Some(DecodeState::Decoded(text)),
                Err(_) => None,
            },
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            DecodeState::Decoded(text) => Some(text),
            _ => None,
        }
    }
}
