use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use fs4::fs_std::FileExt;
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, mpsc};

use crate::diff::{diff_snapshots, merge_items};
use crate::error::StoreError;
use crate::store::{ChangeBus, Snapshot, Store, Subscription};

pub const STORAGE_FILE: &str = "storage.json";
pub const LOCK_FILE: &str = "storage.json.lock";

struct FileInner {
    path: PathBuf,
    /// Last state this process knows to be on disk.
    snapshot: Mutex<Snapshot>,
    bus: ChangeBus,
}

/// Durable store backed by a single JSON document.
///
/// Several processes may open the same directory. Writes from another process
/// are picked up by a file watcher (or the next `get`/`set`) and broadcast as
/// key-level diffs, so every surface sees them like local writes. Writers
/// serialize on an advisory lock over `storage.json.lock`, so each `set`
/// merges into the latest committed document.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileInner>,
    _watcher: Arc<StdMutex<RecommendedWatcher>>,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io(dir, e))?;

        let path = dir.join(STORAGE_FILE);
        let snapshot = read_snapshot(&path).await?;
        info!("store: opened {:?} ({} keys)", path, snapshot.len());

        let inner = Arc::new(FileInner {
            path,
            snapshot: Mutex::new(snapshot),
            bus: ChangeBus::default(),
        });

        let (watch_tx, watch_rx) = mpsc::channel::<notify::Result<Event>>(32);
        let mut watcher = recommended_watcher(move |res| {
            let _ = watch_tx.blocking_send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tokio::spawn(watch_loop(Arc::downgrade(&inner), watch_rx));

        Ok(Self {
            inner,
            _watcher: Arc::new(StdMutex::new(watcher)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl FileInner {
    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Pulls in whatever other processes committed and broadcasts the difference.
    async fn refresh(&self, snapshot: &mut Snapshot) -> Result<(), StoreError> {
        let on_disk = read_snapshot(&self.path).await?;
        let external = diff_snapshots(snapshot, &on_disk);
        if !external.is_empty() {
            debug!("store: external change {:?}", external.keys().collect::<Vec<_>>());
        }
        *snapshot = on_disk;
        self.bus.publish(external);
        Ok(())
    }
}

async fn watch_loop(inner: Weak<FileInner>, mut watch_rx: mpsc::Receiver<notify::Result<Event>>) {
    while let Some(res) = watch_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match res {
            Ok(event) => {
                if !touches_storage_file(&event, &inner.path) {
                    continue;
                }
                let mut snapshot = inner.snapshot.lock().await;
                if let Err(e) = inner.refresh(&mut snapshot).await {
                    warn!("store: failed to reload {:?}: {}", inner.path, e);
                }
            }
            Err(e) => error!("watch error: {:?}", e),
        }
    }
    debug!("store: watcher stopped");
}

fn touches_storage_file(event: &Event, path: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind && event.paths.iter().any(|p| p.file_name() == path.file_name())
}

async fn read_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(Snapshot::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Held for a whole read-merge-write cycle. Dropping it closes the file and
/// releases the lock.
struct WriteLock {
    _file: File,
}

async fn lock_for_write(dir: &Path) -> Result<WriteLock, StoreError> {
    let path = dir.join(LOCK_FILE);
    tokio::task::spawn_blocking(move || -> Result<WriteLock, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.lock_exclusive().map_err(|e| StoreError::io(&path, e))?;
        Ok(WriteLock { _file: file })
    })
    .await
    .map_err(|e| StoreError::io(dir, std::io::Error::other(e)))?
}

/// Private temp file + fsync + rename, so readers never observe a half-written
/// document and concurrent writers never share a temp path.
async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let target = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let dir = target.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(&bytes)
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&target)
            .map_err(|e| StoreError::io(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::io(path, std::io::Error::other(e)))?
}

impl Store for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Snapshot, StoreError> {
        let mut snapshot = self.inner.snapshot.lock().await;
        self.inner.refresh(&mut snapshot).await?;

        Ok(keys
            .iter()
            .filter_map(|k| snapshot.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Snapshot) -> Result<(), StoreError> {
        let mut snapshot = self.inner.snapshot.lock().await;
        let _lock = lock_for_write(self.inner.dir()).await?;
        self.inner.refresh(&mut snapshot).await?;

        let mut next = snapshot.clone();
        let changes = merge_items(&mut next, items);
        if changes.is_empty() {
            return Ok(());
        }

        write_snapshot(&self.inner.path, &next).await?;
        debug!("store: wrote {:?}", changes.keys().collect::<Vec<_>>());
        // Updated before the watcher sees our own rename, so its diff is empty.
        *snapshot = next;
        self.inner.bus.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }
}
