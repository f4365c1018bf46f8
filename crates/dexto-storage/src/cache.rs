//! TTL'd key/value cache contract and the in-memory variant.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::StorageResult;

/// TTL'd key/value cache.
///
/// TTL is enforced lazily on read; implementations may additionally sweep
/// eagerly. Implementations must be safe under concurrent use.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a key. Expired entries are treated as absent.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Write a key with an optional TTL.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StorageResult<()>;

    /// Delete a key. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Drop everything.
    async fn clear(&self) -> StorageResult<()>;
}

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly remove expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(removed, "Cache sweep removed expired entries");
        }
        removed
    }

    /// Number of entries, including not-yet-swept expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StorageResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_owned(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_without_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", json!("v"), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_expired_entry_invisible_before_sweep() {
        let cache = MemoryCache::new();
        cache
            .set("k", json!("v"), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        // Not swept yet, but reads must already treat it as absent.
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let cache = MemoryCache::new();
        cache
            .set("dead", json!(1), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        cache.set("alive", json!(2), None).await.unwrap();

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("alive").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCache::new();
        cache.set("a", json!(1), None).await.unwrap();
        cache.set("b", json!(2), None).await.unwrap();

        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }
}
