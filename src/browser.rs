use std::future::Future;
use std::sync::{Arc, Mutex};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub title: String,
    pub url: String,
}

/// Tab queries and lifecycle control provided by the host browser.
pub trait Browser: Send + Sync + 'static {
    /// Foreground tab of the foreground window.
    fn active_tab(&self) -> impl Future<Output = Result<Option<TabInfo>, Error>> + Send;

    fn find_tab(&self, url: &str) -> impl Future<Output = Result<Option<TabInfo>, Error>> + Send;

    fn focus_tab(&self, id: i64) -> impl Future<Output = Result<(), Error>> + Send;

    fn open_tab(&self, url: &str) -> impl Future<Output = Result<TabInfo, Error>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullViewOutcome {
    Refocused(i64),
    Opened(i64),
}

/// Brings the full-page view to the front, reusing an open tab when there is one.
pub async fn open_full_view<B: Browser>(browser: &B, url: &str) -> Result<FullViewOutcome, Error> {
    if let Some(tab) = browser.find_tab(url).await? {
        browser.focus_tab(tab.id).await?;
        info!("full view: refocused tab {}", tab.id);
        return Ok(FullViewOutcome::Refocused(tab.id));
    }

    let tab = browser.open_tab(url).await?;
    info!("full view: opened tab {}", tab.id);
    Ok(FullViewOutcome::Opened(tab.id))
}

#[derive(Debug, Default)]
struct MemoryTabs {
    tabs: Vec<TabInfo>,
    active: Option<i64>,
    next_id: i64,
}

/// In-memory tab strip, used where no real browser is attached.
#[derive(Debug, Clone, Default)]
pub struct MemoryBrowser {
    state: Arc<Mutex<MemoryTabs>>,
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A browser whose foreground tab shows `url`.
    pub fn with_active(title: &str, url: &str) -> Self {
        let browser = Self::new();
        let id = browser.push_tab(title, url);
        browser.lock().active = Some(id);
        browser
    }

    pub fn push_tab(&self, title: &str, url: &str) -> i64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.tabs.push(TabInfo {
            id,
            title: title.to_string(),
            url: url.to_string(),
        });
        id
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.lock().tabs.clone()
    }

    pub fn active_id(&self) -> Option<i64> {
        self.lock().active
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTabs> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Browser for MemoryBrowser {
    async fn active_tab(&self) -> Result<Option<TabInfo>, Error> {
        let state = self.lock();
        Ok(state
            .active
            .and_then(|id| state.tabs.iter().find(|t| t.id == id).cloned()))
    }

    async fn find_tab(&self, url: &str) -> Result<Option<TabInfo>, Error> {
        Ok(self.lock().tabs.iter().find(|t| t.url == url).cloned())
    }

    async fn focus_tab(&self, id: i64) -> Result<(), Error> {
        let mut state = self.lock();
        if !state.tabs.iter().any(|t| t.id == id) {
            return Err(Error::Browser(format!("no tab {}", id)));
        }
        state.active = Some(id);
        Ok(())
    }

    async fn open_tab(&self, url: &str) -> Result<TabInfo, Error> {
        let id = self.push_tab("", url);
        self.lock().active = Some(id);
        Ok(TabInfo {
            id,
            title: String::new(),
            url: url.to_string(),
        })
    }
}
