use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::browser::{Browser, FullViewOutcome, open_full_view};
use crate::error::{DecodeError, Error, Result, ValidationError};
use crate::favorites::{self, IdClock};
use crate::model::{DecodeState, Draft, Favorite, Language, Theme, ThemeMode, keys};
use crate::qr;
use crate::role::{DraftSeed, SurfaceRole, draft_from_tab};
use crate::state::{Field, SessionView};
use crate::store::{Changes, Notification, Snapshot, Store, Subscription, items};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient user-facing message left by the last action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// One mounted surface: its view of the store plus the actions it can take.
///
/// Actions write to the store first and only then touch the local view, so a
/// failed write leaves the view as it was. The store echoes every write back
/// through the subscription; re-applying an identical value is a no-op.
pub struct Session<S: Store, B: Browser> {
    store: S,
    browser: B,
    role: SurfaceRole,
    prefers_dark: bool,
    view: SessionView,
    seed: DraftSeed,
    /// Slot content a tab seed replaced; cleared once the slot changes.
    seeded_over: Option<Option<Value>>,
    ids: IdClock,
    subscription: Option<Subscription>,
    notice: Option<Notice>,
}

impl<S: Store, B: Browser> Session<S, B> {
    /// Registers the listener, hydrates the view and, for the popup, seeds the draft.
    pub async fn mount(store: S, browser: B, role: SurfaceRole, prefers_dark: bool) -> Result<Self> {
        // Subscribe before reading so nothing committed in between is missed.
        let subscription = store.subscribe();

        let mut wanted = keys::SHARED.to_vec();
        if role == SurfaceRole::FullPage {
            wanted.push(role.draft_key());
        }
        let stored = store.get(&wanted).await?;
        let view = SessionView::hydrate(role, &stored);

        let ids = IdClock::new();
        ids.observe(&view.favorites);

        let mut session = Self {
            store,
            browser,
            role,
            prefers_dark,
            view,
            seed: DraftSeed::Unseeded,
            seeded_over: None,
            ids,
            subscription: Some(subscription),
            notice: None,
        };

        if role == SurfaceRole::Popup {
            session.seed_popup_draft().await?;
        }

        info!(
            "session: mounted {:?} (theme {:?}, language {:?}, {} favorites)",
            role,
            session.view.theme,
            session.view.language,
            session.view.favorites.len()
        );
        Ok(session)
    }

    /// Entered once per popup instance.
    async fn seed_popup_draft(&mut self) -> Result<()> {
        let tab = match self.browser.active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                warn!("session: active tab query failed: {}", e);
                None
            }
        };

        let slot = self.role.draft_key();
        let stored = self.store.get(&[slot]).await?;

        if let Some(draft) = draft_from_tab(tab.as_ref()) {
            debug!("session: popup draft seeded from tab {:?}", draft.url);
            self.view.draft = draft;
            self.seed = DraftSeed::TabSeeded;
            self.seeded_over = Some(stored.get(slot).cloned());
            return Ok(());
        }

        self.view.apply_key(self.role, slot, stored.get(slot));
        // Re-persisting the restored draft creates the slot on first use.
        self.store
            .set(items([(slot, draft_value(&self.view.draft))]))
            .await?;
        self.seed = DraftSeed::FallbackSeeded;
        debug!("session: popup draft restored from {}", slot);
        Ok(())
    }

    pub fn role(&self) -> SurfaceRole {
        self.role
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn seed(&self) -> DraftSeed {
        self.seed
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Painted colour scheme, the `theme-mode` attribute of the page.
    pub fn theme_mode(&self) -> ThemeMode {
        self.view.theme.resolve(self.prefers_dark)
    }

    /// The system colour-scheme preference changed; only matters for `system`.
    pub fn set_prefers_dark(&mut self, prefers_dark: bool) {
        self.prefers_dark = prefers_dark;
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Stops listening. The store keeps every value already written.
    pub fn unmount(&mut self) {
        if self.subscription.take().is_some() {
            info!("session: unmounted {:?}", self.role);
        }
    }

    // ---- notifications ----

    fn apply_changes(&mut self, changes: &Changes) -> Vec<Field> {
        let fields = self.view.apply(self.role, changes);
        if changes.contains_key(self.role.draft_key()) {
            self.seeded_over = None;
        }
        if fields.contains(&Field::Favorites) {
            self.ids.observe(&self.view.favorites);
        }
        if fields.is_empty() {
            debug!("session: {:?} no-op for {:?}", self.role, changes.keys().collect::<Vec<_>>());
        } else {
            info!("session: {:?} applied {:?}", self.role, fields);
        }
        fields
    }

    /// Re-reads every followed key after notifications were dropped.
    async fn resync(&mut self) -> Result<Vec<Field>> {
        let slot = self.role.draft_key();
        let mut wanted = keys::SHARED.to_vec();
        wanted.push(slot);
        let stored = self.store.get(&wanted).await?;

        let mut fields = Vec::new();
        for key in wanted {
            let value = stored.get(key);
            // Same rule as live updates: a tab seed stands until the slot changes.
            if key == slot && self.seeded_over.as_ref() == Some(&value.cloned()) {
                continue;
            }
            if key == slot {
                self.seeded_over = None;
            }
            if let Some(field) = self.view.apply_key(self.role, key, value) {
                fields.push(field);
            }
        }
        self.ids.observe(&self.view.favorites);
        warn!("session: {:?} resynced after lag, changed {:?}", self.role, fields);
        Ok(fields)
    }

    async fn handle(&mut self, notification: Notification) -> Result<Vec<Field>> {
        match notification {
            Notification::Changes(changes) => Ok(self.apply_changes(&changes)),
            Notification::Missed(n) => {
                warn!("session: {:?} missed {} notifications", self.role, n);
                self.resync().await
            }
        }
    }

    /// Applies every notification already delivered, without waiting.
    pub async fn sync(&mut self) -> Result<Vec<Field>> {
        let mut fields = Vec::new();
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return Ok(fields);
            };
            let Some(next) = subscription.try_recv() else {
                return Ok(fields);
            };
            for field in self.handle(next?).await? {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
    }

    /// Waits for the next notification and applies it. `None` once unmounted.
    pub async fn next_change(&mut self) -> Result<Option<Vec<Field>>> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Ok(None);
        };
        let notification = subscription.recv().await?;
        self.handle(notification).await.map(Some)
    }

    // ---- actions ----

    fn report<T>(&mut self, result: Result<T>, success: &str) -> Result<T> {
        if result.is_ok() {
            self.notice = Some(Notice {
                level: NoticeLevel::Success,
                message: success.to_string(),
            });
        }
        self.report_failure(result)
    }

    /// For frequent actions that only surface a notice when they fail.
    fn report_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("session: {:?} action failed: {}", self.role, e);
            self.notice = Some(Notice {
                level: NoticeLevel::Error,
                message: e.to_string(),
            });
        }
        result
    }

    async fn write(&mut self, key: &str, value: Value) -> Result<()> {
        self.store.set(items([(key, value.clone())])).await?;
        self.apply_changes(&local_change(key, value));
        Ok(())
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<()> {
        let result = self.write(keys::THEME, json!(theme)).await;
        self.report_failure(result)
    }

    /// Flips the painted mode and persists the explicit choice.
    pub async fn toggle_theme(&mut self) -> Result<Theme> {
        let next = self.view.theme.toggled(self.prefers_dark);
        self.set_theme(next).await?;
        Ok(next)
    }

    pub async fn toggle_language(&mut self) -> Result<Language> {
        let next = self.view.language.toggled();
        let result = self.write(keys::LANGUAGE, json!(next)).await;
        self.report_failure(result)?;
        Ok(next)
    }

    pub async fn select_tab(&mut self, tab: &str) -> Result<()> {
        let result = self.write(keys::ACTIVE_TAB, json!(tab)).await;
        self.report_failure(result)
    }

    /// Writes both draft fields as one document into this surface's slot.
    pub async fn edit_draft(&mut self, name: &str, url: &str) -> Result<()> {
        let draft = Draft::new(name, url);
        let result = self.write(self.role.draft_key(), draft_value(&draft)).await;
        self.report_failure(result)
    }

    pub async fn edit_name(&mut self, name: &str) -> Result<()> {
        let url = self.view.draft.url.clone();
        self.edit_draft(name, &url).await
    }

    pub async fn edit_url(&mut self, url: &str) -> Result<()> {
        let name = self.view.draft.name.clone();
        self.edit_draft(&name, url).await
    }

    async fn stored_favorites(&self) -> Result<Vec<Favorite>> {
        let stored = self.store.get(&[keys::FAVORITES]).await?;
        Ok(favorites::from_value(stored.get(keys::FAVORITES)).unwrap_or_default())
    }

    async fn write_favorites(&mut self, list: &[Favorite]) -> Result<()> {
        let value = serde_json::to_value(list).map_err(crate::error::StoreError::from)?;
        self.write(keys::FAVORITES, value).await
    }

    /// Validates, then prepends a new entry to the stored list in one write.
    pub async fn save_favorite(&mut self, name: &str, url: &str) -> Result<Favorite> {
        let result = self.try_save_favorite(name, url).await;
        self.report(result, "saved")
    }

    async fn try_save_favorite(&mut self, name: &str, url: &str) -> Result<Favorite> {
        favorites::validate(name, url)?;
        let current = self.stored_favorites().await?;
        self.ids.observe(&current);

        let favorite = Favorite {
            id: self.ids.next_id(),
            name: name.to_string(),
            url: url.to_string(),
        };
        self.write_favorites(&favorites::prepend(&current, favorite.clone()))
            .await?;
        info!("favorites: saved {} ({})", favorite.id, favorite.url);
        Ok(favorite)
    }

    /// Saves what is currently in the draft.
    pub async fn save_draft(&mut self) -> Result<Favorite> {
        let Draft { name, url } = self.view.draft.clone();
        self.save_favorite(&name, &url).await
    }

    pub async fn update_favorite(&mut self, id: i64, name: &str, url: &str) -> Result<()> {
        let result = self.try_update_favorite(id, name, url).await;
        self.report(result, "updated")
    }

    async fn try_update_favorite(&mut self, id: i64, name: &str, url: &str) -> Result<()> {
        favorites::validate(name, url)?;
        let current = self.stored_favorites().await?;
        let updated = favorites::update(&current, id, name, url)?;
        self.write_favorites(&updated).await
    }

    pub async fn delete_favorite(&mut self, id: i64) -> Result<()> {
        let result = self.try_delete_favorite(id).await;
        self.report(result, "deleted")
    }

    async fn try_delete_favorite(&mut self, id: i64) -> Result<()> {
        let current = self.stored_favorites().await?;
        self.write_favorites(&favorites::remove(&current, id)).await
    }

    pub fn search_favorites(&self, query: &str) -> Vec<&Favorite> {
        favorites::search(&self.view.favorites, query)
    }

    /// Clears the shared result, decodes off the event loop, and stores the
    /// payload on success. On failure the result stays cleared.
    pub async fn decode_image(&mut self, bytes: Vec<u8>) -> Result<String> {
        let result = self.try_decode_image(bytes).await;
        self.report(result, "decoded")
    }

    async fn try_decode_image(&mut self, bytes: Vec<u8>) -> Result<String> {
        self.write_decode(DecodeState::Cleared).await?;

        let text = tokio::task::spawn_blocking(move || qr::decode_image_bytes(&bytes))
            .await
            .map_err(|e| DecodeError::ImageLoad(e.to_string()))??;

        self.write_decode(DecodeState::Decoded(text.clone())).await?;
        Ok(text)
    }

    async fn write_decode(&mut self, state: DecodeState) -> Result<()> {
        let value = state.to_value().unwrap_or(Value::Null);
        self.write(keys::DECODED_RESULT, value).await
    }

    /// Saves the draft's symbol as `<name>.png` in `dir`.
    pub async fn download_draft(&mut self, dir: &Path) -> Result<PathBuf> {
        let Draft { name, url } = self.view.draft.clone();
        let result = download(url, name, qr::PREVIEW_SIZE, dir.to_path_buf()).await;
        self.report(result, "downloaded")
    }

    pub async fn download_favorite(&mut self, id: i64, dir: &Path) -> Result<PathBuf> {
        let result = match self.view.favorites.iter().find(|f| f.id == id).cloned() {
            Some(f) => download(f.url, f.name, qr::DOWNLOAD_SIZE, dir.to_path_buf()).await,
            None => Err(ValidationError::UnknownFavorite(id).into()),
        };
        self.report(result, "downloaded")
    }

    /// Focuses or opens the full-page view. The popup closes afterwards.
    pub async fn open_full_view(&mut self, url: &str) -> Result<FullViewOutcome> {
        let result = open_full_view(&self.browser, url).await;
        let outcome = self.report_failure(result)?;
        if self.role == SurfaceRole::Popup {
            self.unmount();
        }
        Ok(outcome)
    }
}

async fn download(url: String, name: String, size: u32, dir: PathBuf) -> Result<PathBuf> {
    if url.trim().is_empty() {
        return Err(ValidationError::EmptyUrl.into());
    }
    tokio::task::spawn_blocking(move || qr::save_png(&url, &name, size, &dir))
        .await
        .map_err(|e| Error::Encode(e.to_string()))?
}

fn draft_value(draft: &Draft) -> Value {
    json!({ "name": draft.name, "url": draft.url })
}

fn local_change(key: &str, value: Value) -> Changes {
    let mut changes = Changes::new();
    changes.insert(
        key.to_string(),
        crate::store::StorageChange {
            old_value: None,
            new_value: Some(value),
        },
    );
    changes
}

/// Convenience for callers that only need a one-off read of the whole session.
pub async fn read_view<S: Store>(store: &S, role: SurfaceRole) -> Result<SessionView> {
    let stored: Snapshot = store.get(&role.subscribed_keys()).await?;
    Ok(SessionView::hydrate(role, &stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MemoryBrowser;
    use crate::error::StoreError;
    use crate::model::{TAB_DECODE, ThemeMode};
    use crate::store::MemoryStore;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    type TestSession = Session<MemoryStore, MemoryBrowser>;

    /// Memory store whose writes can be made to fail.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Arc<AtomicBool>,
    }

    impl Store for FlakyStore {
        async fn get(&self, keys: &[&str]) -> std::result::Result<Snapshot, StoreError> {
            self.inner.get(keys).await
        }

        async fn set(&self, items: Snapshot) -> std::result::Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::io(
                    Path::new("storage.json"),
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.set(items).await
        }

        fn subscribe(&self) -> Subscription {
            self.inner.subscribe()
        }
    }

    async fn full_page(store: &MemoryStore) -> TestSession {
        Session::mount(store.clone(), MemoryBrowser::new(), SurfaceRole::FullPage, false)
            .await
            .unwrap()
    }

    async fn popup(store: &MemoryStore, browser: MemoryBrowser) -> TestSession {
        Session::mount(store.clone(), browser, SurfaceRole::Popup, false)
            .await
            .unwrap()
    }

    fn png(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_eventual_convergence_across_surfaces() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let mut pop = popup(&store, MemoryBrowser::new()).await;

        full.select_tab(TAB_DECODE).await.unwrap();
        full.toggle_language().await.unwrap();
        pop.toggle_theme().await.unwrap();

        full.sync().await.unwrap();
        pop.sync().await.unwrap();

        let stored = read_view(&store, SurfaceRole::FullPage).await.unwrap();
        for view in [full.view(), pop.view()] {
            assert_eq!(view.active_tab, stored.active_tab);
            assert_eq!(view.language, stored.language);
            assert_eq!(view.theme, stored.theme);
        }
        assert_eq!(stored.language, Language::En);
        assert_eq!(stored.theme, Theme::Dark);
    }

    #[tokio::test]
    async fn test_own_echo_causes_no_further_write() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;

        full.edit_draft("Example", "https://example.com").await.unwrap();
        full.toggle_theme().await.unwrap();
        let writes = store.write_count();

        let fields = full.sync().await.unwrap();

        assert!(fields.is_empty());
        assert_eq!(store.write_count(), writes);
        assert_eq!(full.view().draft, Draft::new("Example", "https://example.com"));
    }

    #[tokio::test]
    async fn test_draft_slots_are_isolated_by_role() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let mut pop = popup(&store, MemoryBrowser::new()).await;

        full.edit_draft("Full", "https://full.example").await.unwrap();
        pop.edit_draft("Pop", "https://pop.example").await.unwrap();
        full.sync().await.unwrap();
        pop.sync().await.unwrap();

        assert_eq!(full.view().draft, Draft::new("Full", "https://full.example"));
        assert_eq!(pop.view().draft, Draft::new("Pop", "https://pop.example"));

        // A second popup instance shares the popup slot.
        let mut other_pop = popup(&store, MemoryBrowser::new()).await;
        assert_eq!(other_pop.view().draft, pop.view().draft);
        other_pop.edit_url("https://pop2.example").await.unwrap();
        pop.sync().await.unwrap();
        full.sync().await.unwrap();
        assert_eq!(pop.view().draft.url, "https://pop2.example");
        assert_eq!(full.view().draft.url, "https://full.example");
    }

    #[tokio::test]
    async fn test_favorites_head_insert_with_unique_ids() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;

        let a = full.save_favorite("A", "https://a.example").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let b = full.save_favorite("B", "https://b.example").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(full.view().favorites, vec![b.clone(), a.clone()]);

        // Same millisecond is still unique.
        let c = full.save_favorite("C", "https://c.example").await.unwrap();
        let d = full.save_favorite("D", "https://d.example").await.unwrap();
        assert_ne!(c.id, d.id);
        assert_eq!(full.view().favorites[0], d);
    }

    #[tokio::test]
    async fn test_validation_gate() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let writes = store.write_count();

        let err = full.save_favorite("", "https://example.com").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyName)));
        assert_eq!(store.write_count(), writes);
        assert_eq!(full.notice().map(|n| n.level), Some(NoticeLevel::Error));

        let saved = full.save_favorite("Example", "https://example.com").await.unwrap();
        assert_eq!(store.write_count(), writes + 1);
        let stored = read_view(&store, SurfaceRole::FullPage).await.unwrap();
        assert_eq!(stored.favorites[0], saved);
        assert_eq!(full.take_notice().map(|n| n.level), Some(NoticeLevel::Success));
        assert!(full.notice().is_none());
    }

    #[tokio::test]
    async fn test_favorite_edits_reach_other_surface() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let mut pop = popup(&store, MemoryBrowser::new()).await;

        let saved = pop.save_favorite("Docs", "https://docs.rs").await.unwrap();
        full.sync().await.unwrap();
        assert_eq!(full.view().favorites, vec![saved.clone()]);

        full.update_favorite(saved.id, "Docs.rs", "https://docs.rs/").await.unwrap();
        pop.sync().await.unwrap();
        assert_eq!(pop.view().favorites[0].name, "Docs.rs");
        assert_eq!(pop.search_favorites("DOCS").len(), 1);

        let err = pop.update_favorite(saved.id + 1, "x", "y").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownFavorite(_))));

        pop.delete_favorite(saved.id).await.unwrap();
        full.sync().await.unwrap();
        assert!(full.view().favorites.is_empty());
    }

    #[tokio::test]
    async fn test_decode_success_and_failure() {
        let store = MemoryStore::new();
        let mut decoder = full_page(&store).await;
        let mut watcher = popup(&store, MemoryBrowser::new()).await;
        assert_eq!(watcher.view().decode, DecodeState::NotStarted);

        let symbol = qr::render_rgba("hello", qr::PREVIEW_SIZE).unwrap();
        let text = decoder.decode_image(png(&symbol)).await.unwrap();
        assert_eq!(text, "hello");
        watcher.sync().await.unwrap();
        assert_eq!(watcher.view().decode, DecodeState::Decoded("hello".into()));

        let blank = RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255]));
        let err = decoder.decode_image(png(&blank)).await.unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::NotFound)));
        assert_eq!(decoder.view().decode, DecodeState::Cleared);
        watcher.sync().await.unwrap();
        assert_eq!(watcher.view().decode, DecodeState::Cleared);

        let err = decoder.decode_image(b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::ImageLoad(_))));
    }

    #[tokio::test]
    async fn test_last_write_wins_on_theme() {
        let store = MemoryStore::new();
        let mut x = full_page(&store).await;
        let mut y = popup(&store, MemoryBrowser::new()).await;
        let mut z = full_page(&store).await;

        x.set_theme(Theme::Dark).await.unwrap();
        y.set_theme(Theme::Light).await.unwrap();

        for s in [&mut x, &mut y, &mut z] {
            s.sync().await.unwrap();
            assert_eq!(s.view().theme, Theme::Light);
        }
    }

    #[tokio::test]
    async fn test_popup_seeds_from_usable_tab() {
        let store = MemoryStore::new();
        let mut prior = popup(&store, MemoryBrowser::new()).await;
        prior.edit_draft("Old", "https://old.example").await.unwrap();
        let before = store.snapshot();

        let pop = popup(&store, MemoryBrowser::with_active("Example", "https://example.com")).await;

        assert_eq!(pop.seed(), DraftSeed::TabSeeded);
        assert_eq!(pop.view().draft, Draft::new("Example", "https://example.com"));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_popup_falls_back_to_last_draft() {
        let store = MemoryStore::new();
        let mut prior = popup(&store, MemoryBrowser::new()).await;
        prior.edit_draft("Old", "https://old.example").await.unwrap();

        let pop = popup(&store, MemoryBrowser::with_active("New Tab", "chrome://newtab/")).await;
        assert_eq!(pop.seed(), DraftSeed::FallbackSeeded);
        assert_eq!(pop.view().draft, Draft::new("Old", "https://old.example"));

        let empty = MemoryStore::new();
        let fresh = popup(&empty, MemoryBrowser::new()).await;
        assert_eq!(fresh.seed(), DraftSeed::FallbackSeeded);
        assert_eq!(fresh.view().draft, Draft::default());
    }

    #[tokio::test]
    async fn test_full_page_never_seeds_from_tab() {
        let store = MemoryStore::new();
        let full = Session::mount(
            store.clone(),
            MemoryBrowser::with_active("Example", "https://example.com"),
            SurfaceRole::FullPage,
            false,
        )
        .await
        .unwrap();
        assert_eq!(full.seed(), DraftSeed::Unseeded);
        assert_eq!(full.view().draft, Draft::default());
    }

    #[tokio::test]
    async fn test_unmounted_surface_stops_listening_without_losing_data() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let mut pop = popup(&store, MemoryBrowser::new()).await;
        assert_eq!(store.listener_count(), 2);

        pop.unmount();
        assert_eq!(store.listener_count(), 1);
        assert_eq!(pop.next_change().await.unwrap(), None);

        full.toggle_language().await.unwrap();
        let reopened = popup(&store, MemoryBrowser::new()).await;
        assert_eq!(reopened.view().language, Language::En);
    }

    #[tokio::test]
    async fn test_lagging_surface_resyncs() {
        let store = MemoryStore::new();
        let mut slow = full_page(&store).await;
        let mut busy = popup(&store, MemoryBrowser::new()).await;

        for i in 0..300 {
            busy.select_tab(&i.to_string()).await.unwrap();
        }
        slow.sync().await.unwrap();
        assert_eq!(slow.view().active_tab, "299");
    }

    #[tokio::test]
    async fn test_tab_seeded_popup_resync_matches_live_updates() {
        let store = MemoryStore::new();
        let mut prior = popup(&store, MemoryBrowser::new()).await;
        prior.edit_draft("Old", "https://old.example").await.unwrap();

        let mut pop = popup(&store, MemoryBrowser::with_active("Example", "https://example.com")).await;
        let mut full = full_page(&store).await;
        assert_eq!(pop.seed(), DraftSeed::TabSeeded);

        // Lag while the slot still holds the old draft: the tab seed stands.
        for i in 0..300 {
            full.select_tab(&i.to_string()).await.unwrap();
        }
        pop.sync().await.unwrap();
        assert_eq!(pop.view().active_tab, "299");
        assert_eq!(pop.view().draft, Draft::new("Example", "https://example.com"));

        // Lag that swallows a rewrite of the slot: adopted, as a live update would be.
        prior.edit_draft("Newer", "https://newer.example").await.unwrap();
        for i in 0..300 {
            full.select_tab(&i.to_string()).await.unwrap();
        }
        pop.sync().await.unwrap();
        assert_eq!(pop.view().draft, Draft::new("Newer", "https://newer.example"));
        assert_eq!(pop.seed(), DraftSeed::TabSeeded);
    }

    #[tokio::test]
    async fn test_failed_writes_leave_view_and_record_notice() {
        let store = FlakyStore::default();
        let mut full = Session::mount(store.clone(), MemoryBrowser::new(), SurfaceRole::FullPage, false)
            .await
            .unwrap();
        full.edit_draft("Example", "https://example.com").await.unwrap();
        assert!(full.notice().is_none());

        store.fail_writes.store(true, Ordering::SeqCst);
        let before = full.view().clone();

        assert!(full.toggle_theme().await.is_err());
        let notice = full.take_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("disk full"));

        assert!(full.toggle_language().await.is_err());
        assert_eq!(full.take_notice().map(|n| n.level), Some(NoticeLevel::Error));
        assert!(full.select_tab(TAB_DECODE).await.is_err());
        assert_eq!(full.take_notice().map(|n| n.level), Some(NoticeLevel::Error));
        assert!(full.edit_url("https://other.example").await.is_err());
        assert_eq!(full.take_notice().map(|n| n.level), Some(NoticeLevel::Error));

        assert_eq!(full.view(), &before);
        assert_eq!(store.inner.snapshot()[keys::CURRENT_QR_CODE]["url"], json!("https://example.com"));
    }

    #[tokio::test]
    async fn test_next_change_waits_for_other_surface() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let other = store.clone();

        let writer = tokio::spawn(async move {
            other
                .set(items([(keys::LANGUAGE, json!("en"))]))
                .await
                .unwrap();
        });

        let fields = full.next_change().await.unwrap();
        writer.await.unwrap();
        assert_eq!(fields, Some(vec![Field::Language]));
    }

    #[tokio::test]
    async fn test_theme_mode_follows_system_preference() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        assert_eq!(full.theme_mode(), ThemeMode::Light);
        full.set_prefers_dark(true);
        assert_eq!(full.theme_mode(), ThemeMode::Dark);

        assert_eq!(full.toggle_theme().await.unwrap(), Theme::Light);
        assert_eq!(full.theme_mode(), ThemeMode::Light);
    }

    #[tokio::test]
    async fn test_open_full_view_closes_popup() {
        let store = MemoryStore::new();
        let browser = MemoryBrowser::with_active("Example", "https://example.com");
        let mut pop = popup(&store, browser.clone()).await;

        let outcome = pop.open_full_view("ext://ez-qr/index.html").await.unwrap();
        assert!(matches!(outcome, FullViewOutcome::Opened(_)));
        assert!(!pop.is_mounted());
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_download_requires_url() {
        let store = MemoryStore::new();
        let mut full = full_page(&store).await;
        let dir = tempfile::tempdir().unwrap();

        let err = full.download_draft(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyUrl)));

        full.edit_draft("", "https://example.com").await.unwrap();
        let path = full.download_draft(dir.path()).await.unwrap();
        assert!(path.ends_with("qrcode.png"));
    }
}
