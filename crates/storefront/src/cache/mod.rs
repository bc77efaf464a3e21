//! Durable local key-value cache.
//!
//! Holds the last known cart of each user (`cart_{uid}`) and the persisted
//! sign-in (`auth_session`). Values are opaque strings, JSON in practice.
//!
//! - [`FileCache`] - one file per key under a directory
//! - [`MemoryCache`] - in-memory, backed by `moka`

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use async_trait::async_trait;
use shopez_core::Uid;
use thiserror::Error;

/// Key under which the persisted sign-in is stored.
pub const AUTH_SESSION_KEY: &str = "auth_session";

/// Key under which a user's last known cart is stored.
#[must_use]
pub fn cart_key(uid: &Uid) -> String {
    format!("cart_{uid}")
}

/// Errors returned by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key contains characters that are not allowed.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// A durable string-to-string store.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Delete a value. A missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}
