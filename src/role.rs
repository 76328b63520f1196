use serde::{Deserialize, Serialize};

use crate::browser::TabInfo;
use crate::model::{Draft, keys};
use crate::utils::is_usable_url;

pub const POPUP_MAX_WIDTH: u32 = 540;
pub const POPUP_MAX_HEIGHT: u32 = 600;

/// Which kind of surface a session belongs to. Fixed for the life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceRole {
    /// Small, ephemeral window anchored to the toolbar.
    Popup,
    /// Extension page opened in its own tab.
    FullPage,
}

impl SurfaceRole {
    /// Launch-time heuristic: a viewport that fits the popup bounds is the popup.
    pub fn from_viewport(width: u32, height: u32) -> Self {
        if width <= POPUP_MAX_WIDTH && height <= POPUP_MAX_HEIGHT {
            SurfaceRole::Popup
        } else {
            SurfaceRole::FullPage
        }
    }

    /// The private draft slot this surface reads and writes.
    pub fn draft_key(self) -> &'static str {
        match self {
            SurfaceRole::Popup => keys::POPUP_QR_CODE,
            SurfaceRole::FullPage => keys::CURRENT_QR_CODE,
        }
    }

    /// The other role's slot, never read by this surface.
    pub fn foreign_draft_key(self) -> &'static str {
        match self {
            SurfaceRole::Popup => keys::CURRENT_QR_CODE,
            SurfaceRole::FullPage => keys::POPUP_QR_CODE,
        }
    }

    /// Shared keys followed by the own draft slot.
    pub fn subscribed_keys(self) -> Vec<&'static str> {
        let mut out = keys::SHARED.to_vec();
        out.push(self.draft_key());
        out
    }
}

/// How the popup filled its draft when it opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DraftSeed {
    #[default]
    Unseeded,
    /// Taken from the foreground tab; the private slot was left alone.
    TabSeeded,
    /// No usable tab; the last persisted popup draft was restored.
    FallbackSeeded,
}

/// Draft derived from the foreground tab, if its address is usable.
pub fn draft_from_tab(tab: Option<&TabInfo>) -> Option<Draft> {
    let tab = tab?;
    if !is_usable_url(&tab.url) {
        return None;
    }
    Some(Draft::new(tab.title.clone(), tab.url.clone()))
}
