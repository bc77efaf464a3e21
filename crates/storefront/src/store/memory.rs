//! In-process realtime store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Listener, RealtimeStore, StoreError, StoreEvent, StorePath, tree};

/// A realtime store held in memory.
///
/// Behaves like the hosted database for a single client: writes are applied
/// to a JSON tree and every listener whose path overlaps the write receives
/// the new value at its own path. Cloning shares the tree.
///
/// Failure injection ([`fail_reads`](Self::fail_reads),
/// [`fail_next_write`](Self::fail_next_write)) lets callers exercise the
/// error paths of code built on top of the store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    listeners: HashMap<u64, Registration>,
    next_id: u64,
    fail_next_write: Option<String>,
}

struct Registration {
    path: StorePath,
    events: mpsc::UnboundedSender<StoreEvent>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value at `path`.
    #[must_use]
    pub fn value(&self, path: &StorePath) -> Value {
        tree::get(&self.lock().root, path)
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver a read failure to every listener at or below `path`.
    /// Returns how many listeners were notified.
    pub fn fail_reads(&self, path: &StorePath, message: &str) -> usize {
        let inner = self.lock();
        let mut notified = 0;
        for registration in inner.listeners.values() {
            if path.contains(&registration.path)
                && registration
                    .events
                    .send(Err(StoreError::Unavailable(message.to_string())))
                    .is_ok()
            {
                notified += 1;
            }
        }
        notified
    }

    /// Re-deliver the current value to listeners overlapping `path`, as the
    /// hosted store does after a reconnect. Returns how many were notified.
    pub fn emit(&self, path: &StorePath) -> usize {
        let inner = self.lock();
        inner.notify(path)
    }

    /// Make the next `set` or `remove` fail without touching the tree.
    pub fn fail_next_write(&self, message: &str) {
        self.lock().fail_next_write = Some(message.to_string());
    }

    fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_write.take() {
            return Err(StoreError::Unavailable(message));
        }

        let before = tree::get(&inner.root, path);
        if before == value {
            return Ok(());
        }
        tree::set(&mut inner.root, path, value);
        let notified = inner.notify(path);
        tracing::trace!(path = %path, notified, "Memory store write");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn notify(&self, changed: &StorePath) -> usize {
        let mut notified = 0;
        for registration in self.listeners.values() {
            if registration.path.overlaps(changed)
                && registration
                    .events
                    .send(Ok(tree::get(&self.root, &registration.path)))
                    .is_ok()
            {
                notified += 1;
            }
        }
        notified
    }
}

fn detach(inner: &Weak<Mutex<Inner>>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .remove(&id);
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    fn subscribe(&self, path: &StorePath) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            // The receiver is still in scope, so this cannot fail.
            let _ = tx.send(Ok(tree::get(&inner.root, path)));
            inner.listeners.insert(
                id,
                Registration {
                    path: path.clone(),
                    events: tx,
                },
            );
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Listener::new(path.clone(), rx, move || detach(&weak, id))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.write(path, value)
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.write(path, Value::Null)
    }
}
