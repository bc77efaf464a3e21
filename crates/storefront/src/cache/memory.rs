//! In-memory cache.

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheError, LocalCache};

const MAX_ENTRIES: u64 = 1_000;

/// A cache that lives as long as the process. Cloning shares the entries.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, String>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().max_capacity(MAX_ENTRIES).build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
