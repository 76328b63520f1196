use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::diff::merge_items;
use crate::error::StoreError;

/// Full or partial view of the store: key -> JSON document.
pub type Snapshot = BTreeMap<String, Value>;

/// Per-key `{oldValue, newValue}` pair carried by a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type Changes = BTreeMap<String, StorageChange>;

/// One notification, shared by every listener.
pub type ChangeSet = Arc<Changes>;

const BUS_CAPACITY: usize = 256;

/// The persistent key-value store every surface talks to.
///
/// Writes replace whole values and are durable once `set` resolves. Every
/// committed change is broadcast to all subscriptions, the writer's included.
pub trait Store: Send + Sync + 'static {
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Snapshot, StoreError>> + Send;

    fn set(&self, items: Snapshot) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn subscribe(&self) -> Subscription;
}

/// Fan-out side of the notification bus.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeSet>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }
}

impl ChangeBus {
    pub fn publish(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        debug!("bus: {:?}", changes.keys().collect::<Vec<_>>());
        // No receivers just means no surface is open; the store keeps the value.
        let _ = self.tx.send(Arc::new(changes));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    Changes(ChangeSet),
    /// The listener fell behind and `n` change sets were dropped; re-read the store.
    Missed(u64),
}

/// A registered listener. Dropping it unregisters.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeSet>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<Notification, StoreError> {
        match self.rx.recv().await {
            Ok(changes) => Ok(Notification::Changes(changes)),
            Err(RecvError::Lagged(n)) => Ok(Notification::Missed(n)),
            Err(RecvError::Closed) => Err(StoreError::BusClosed),
        }
    }

    /// Non-blocking variant; `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Result<Notification, StoreError>> {
        match self.rx.try_recv() {
            Ok(changes) => Some(Ok(Notification::Changes(changes))),
            Err(TryRecvError::Lagged(n)) => Some(Ok(Notification::Missed(n))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(StoreError::BusClosed)),
        }
    }
}

struct MemoryInner {
    data: Mutex<Snapshot>,
    bus: ChangeBus,
    writes: AtomicUsize,
}

/// In-memory store. Clones share the same data and bus, so each clone can
/// stand in for a separate surface.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_data(Snapshot::new())
    }

    pub fn with_data(data: Snapshot) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                data: Mutex::new(data),
                bus: ChangeBus::default(),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of `set` calls issued so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.bus.listener_count()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        // A poisoned lock only means a panicking writer; the map itself is intact.
        self.inner
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Snapshot, StoreError> {
        let data = self.lock();
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Snapshot) -> Result<(), StoreError> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.lock();
        let changes = merge_items(&mut data, items);
        // Publish under the lock so bus order matches commit order.
        self.inner.bus.publish(changes);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }
}

/// Builds a `set` payload from `(key, value)` pairs.
pub fn items<I, K>(pairs: I) -> Snapshot
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
