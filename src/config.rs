use std::path::PathBuf;

use log::LevelFilter;

use crate::browser::MemoryBrowser;
use crate::role::SurfaceRole;
use crate::utils::parse_flag;

pub const DEFAULT_STORE_DIR: &str = ".ez-qr";
pub const DEFAULT_FULL_VIEW_URL: &str = "ext://ez-qr/index.html";

/// Runtime settings, read from the environment (after `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store_dir: PathBuf,
    pub log_level: LevelFilter,
    pub prefers_dark: bool,
    pub viewport: Option<(u32, u32)>,
    pub full_view_url: String,
    /// `(title, url)` of the tab the popup should treat as foreground.
    pub active_tab: Option<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            log_level: LevelFilter::Info,
            prefers_dark: false,
            viewport: None,
            full_view_url: DEFAULT_FULL_VIEW_URL.to_string(),
            active_tab: None,
        }
    }
}

fn parse_viewport(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("EZQR_STORE_DIR").filter(|v| !v.trim().is_empty()) {
            config.store_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("EZQR_LOG").and_then(|v| v.trim().parse().ok()) {
            config.log_level = level;
        }
        if let Some(flag) = lookup("EZQR_PREFERS_DARK") {
            config.prefers_dark = parse_flag(&flag);
        }
        config.viewport = lookup("EZQR_VIEWPORT").as_deref().and_then(parse_viewport);
        if let Some(url) = lookup("EZQR_FULL_VIEW_URL").filter(|v| !v.trim().is_empty()) {
            config.full_view_url = url;
        }
        if let Some(url) = lookup("EZQR_ACTIVE_TAB_URL") {
            let title = lookup("EZQR_ACTIVE_TAB_TITLE").unwrap_or_default();
            config.active_tab = Some((title, url));
        }

        config
    }

    /// An explicit role wins; otherwise the viewport decides; otherwise full page.
    pub fn role(&self, explicit: Option<SurfaceRole>) -> SurfaceRole {
        explicit
            .or_else(|| self.viewport.map(|(w, h)| SurfaceRole::from_viewport(w, h)))
            .unwrap_or(SurfaceRole::FullPage)
    }

    pub fn browser(&self) -> MemoryBrowser {
        match &self.active_tab {
            Some((title, url)) => MemoryBrowser::with_active(title, url),
            None => MemoryBrowser::new(),
        }
    }
}
