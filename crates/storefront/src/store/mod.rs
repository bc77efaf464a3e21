//! Realtime data store.
//!
//! The cart lives in a hosted realtime database as a JSON tree. This module
//! defines the three operations the client needs from it (subscribe, write a
//! value at a path, delete a path) and two implementations:
//!
//! - [`FirebaseDatabase`] - Firebase Realtime Database over REST and
//!   server-sent events
//! - [`MemoryStore`] - in-process tree, for offline use and tests
//!
//! A subscription is a [`Listener`]. It delivers the full value at its path
//! after every change, in the order the store produced them. Detaching (or
//! dropping) a listener unregisters it before returning; nothing is delivered
//! afterwards.

mod firebase;
mod memory;
mod sse;
pub mod tree;

pub use firebase::FirebaseDatabase;
pub use memory::MemoryStore;

use core::fmt;

use async_trait::async_trait;
use serde_json::Value;
use shopez_core::{ProductId, Uid};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors returned by realtime store operations and listeners.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with a non-success status.
    #[error("Store returned HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// Security rules rejected the operation.
    #[error("Permission denied at {0}")]
    PermissionDenied(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store cancelled the subscription.
    #[error("Subscription cancelled: {0}")]
    Cancelled(String),

    /// The event stream ended.
    #[error("Event stream closed")]
    Disconnected,

    /// The store is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A slash-separated location in the store, e.g. `carts/{uid}/{product_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the tree.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a path, ignoring empty segments (`/a//b/` is `a/b`).
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// `carts/{uid}`
    #[must_use]
    pub fn cart(uid: &Uid) -> Self {
        Self::root().child("carts").child(uid.as_str())
    }

    /// `carts/{uid}/{product_id}`
    #[must_use]
    pub fn cart_line(uid: &Uid, product_id: ProductId) -> Self {
        Self::cart(uid).child(&product_id.to_string())
    }

    /// This path extended by one segment.
    #[must_use]
    pub fn child(mut self, segment: &str) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    /// This path extended by a relative path.
    #[must_use]
    pub fn join(mut self, relative: &Self) -> Self {
        self.segments.extend(relative.segments.iter().cloned());
        self
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` equals `other` or lies above it.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Whether a write at one path can change the value at the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// One delivery to a listener: the full value at its path (`Null` when
/// absent), or a read failure.
pub type StoreEvent = Result<Value, StoreError>;

type DetachFn = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription to a store path.
pub struct Listener {
    path: StorePath,
    events: mpsc::UnboundedReceiver<StoreEvent>,
    detach: Option<DetachFn>,
}

impl Listener {
    /// Wrap a store-side channel. `detach` unregisters the listener from the
    /// store; it runs exactly once, on [`detach`](Self::detach) or drop.
    pub fn new(
        path: StorePath,
        events: mpsc::UnboundedReceiver<StoreEvent>,
        detach: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            path,
            events,
            detach: Some(Box::new(detach)),
        }
    }

    #[must_use]
    pub const fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next event. Returns `None` once detached or when the store
    /// side has gone away.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        if self.detach.is_none() {
            return None;
        }
        self.events.recv().await
    }

    /// Unregister from the store. Safe to call more than once.
    pub fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            self.events.close();
            tracing::debug!(path = %self.path, "Listener detached");
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("path", &self.path)
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

/// Operations the client needs from a realtime store.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Subscribe to the value at `path`. The first event carries the current
    /// value; later events follow every change. Read errors do not end the
    /// listener; only [`Listener::detach`] does.
    fn subscribe(&self, path: &StorePath) -> Listener;

    /// Replace the value at `path`. Writing `Null` deletes it.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Delete the value at `path`. Deleting an absent path succeeds.
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_cart_paths() {
        let uid = Uid::new("u1");
        assert_eq!(StorePath::cart(&uid).to_string(), "/carts/u1");
        assert_eq!(
            StorePath::cart_line(&uid, ProductId::new(9)).to_string(),
            "/carts/u1/9"
        );
    }

    #[test]
    fn test_parse_ignores_empty_segments() {
        assert_eq!(StorePath::parse("/a//b/"), StorePath::root().child("a").child("b"));
        assert!(StorePath::parse("/").is_root());
    }

    #[test]
    fn test_overlaps() {
        let cart = StorePath::parse("carts/u1");
        assert!(cart.overlaps(&StorePath::parse("carts/u1/3")));
        assert!(cart.overlaps(&StorePath::parse("carts")));
        assert!(cart.overlaps(&StorePath::root()));
        assert!(!cart.overlaps(&StorePath::parse("carts/u2")));
        assert!(!cart.overlaps(&StorePath::parse("carts/u10")));
    }

    #[tokio::test]
    async fn test_listener_detach_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&calls);
        let mut listener = Listener::new(StorePath::parse("carts/u1"), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(Ok(Value::Null)).ok();
        listener.detach();
        listener.detach();
        drop(listener);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detached_listener_drops_buffered_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener = Listener::new(StorePath::root(), rx, || {});

        tx.send(Ok(Value::Null)).ok();
        listener.detach();

        assert!(listener.recv().await.is_none());
        assert!(tx.send(Ok(Value::Null)).is_err());
    }
}
