//! Content-addressed blob store contract and the in-memory variant.

use async_trait::async_trait;
use dashmap::DashMap;
use dexto_core::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StorageError, StorageResult};

/// Opaque handle to stored bytes.
///
/// Handles embed the backend tag but never credentials or paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(String);

impl BlobHandle {
    /// Construct a handle from a backend tag and content key.
    #[must_use]
    pub fn new(backend: &str, key: &str) -> Self {
        Self(format!("blob:{backend}:{key}"))
    }

    /// The raw handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The backend tag embedded in the handle, if the handle is well-formed.
    #[must_use]
    pub fn backend(&self) -> Option<&str> {
        self.0.strip_prefix("blob:")?.split(':').next()
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Metadata stored alongside blob bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobMeta {
    /// MIME type, when known.
    pub media_type: Option<String>,
    /// Original name, when known.
    pub name: Option<String>,
    /// When the blob was first stored.
    pub created_at: Option<Timestamp>,
}

/// A blob read back from the store.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    /// The stored bytes.
    pub bytes: Vec<u8>,
    /// The stored metadata.
    pub meta: BlobMeta,
}

/// Content-addressed byte store.
///
/// Implementations must be safe under concurrent use.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning an opaque handle.
    ///
    /// Identical content yields the same handle (dedup); the first writer's
    /// metadata wins.
    async fn put(&self, bytes: Vec<u8>, meta: BlobMeta) -> StorageResult<BlobHandle>;

    /// Fetch a blob by handle.
    async fn get(&self, handle: &BlobHandle) -> StorageResult<BlobRecord>;

    /// Delete a blob. Returns whether it existed.
    async fn delete(&self, handle: &BlobHandle) -> StorageResult<bool>;

    /// List handles, optionally restricted to a handle prefix.
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<BlobHandle>>;
}

struct StoredBlob {
    bytes: Vec<u8>,
    meta: BlobMeta,
}

/// In-process blob store with SHA-256 dedup and size quotas.
pub struct MemoryBlobStore {
    blobs: DashMap<String, StoredBlob>,
    max_blob_bytes: u64,
    max_total_bytes: u64,
    total_bytes: AtomicU64,
}

impl MemoryBlobStore {
    /// Create a store with the given per-blob and total byte caps.
    #[must_use]
    pub fn new(max_blob_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            blobs: DashMap::new(),
            max_blob_bytes,
            max_total_bytes,
            total_bytes: AtomicU64::new(0),
        }
    }

    /// Bytes currently stored (post-dedup).
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    /// Number of distinct blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn content_key(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("len", &self.blobs.len())
            .field("total_bytes", &self.total_bytes())
            .field("max_blob_bytes", &self.max_blob_bytes)
            .field("max_total_bytes", &self.max_total_bytes)
            .finish()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, mut meta: BlobMeta) -> StorageResult<BlobHandle> {
        let size = bytes.len() as u64;
        if size > self.max_blob_bytes {
            return Err(StorageError::BlobQuotaExceeded {
                reason: format!("blob of {size} bytes exceeds per-blob cap {}", self.max_blob_bytes),
            });
        }

        let key = Self::content_key(&bytes);
        let handle = BlobHandle::new("memory", &key);

        if self.blobs.contains_key(&key) {
            // Dedup hit: same content, same handle, no quota charge.
            return Ok(handle);
        }

        let new_total = self
            .total_bytes
            .load(Ordering::Acquire)
            .saturating_add(size);
        if new_total > self.max_total_bytes {
            return Err(StorageError::BlobQuotaExceeded {
                reason: format!(
                    "storing {size} bytes would raise total to {new_total}, cap is {}",
                    self.max_total_bytes
                ),
            });
        }

        if meta.created_at.is_none() {
            meta.created_at = Some(Timestamp::now());
        }

        // A concurrent identical put may have landed; entry() keeps the
        // first and avoids double-charging the quota.
        let mut inserted = false;
        self.blobs.entry(key).or_insert_with(|| {
            inserted = true;
            StoredBlob { bytes, meta }
        });
        if inserted {
            self.total_bytes.fetch_add(size, Ordering::AcqRel);
        }

        Ok(handle)
    }

    async fn get(&self, handle: &BlobHandle) -> StorageResult<BlobRecord> {
        let key = handle
            .as_str()
            .strip_prefix("blob:memory:")
            .ok_or_else(|| StorageError::UnknownBlobHandle(handle.to_string()))?;
        let blob = self
            .blobs
            .get(key)
            .ok_or_else(|| StorageError::UnknownBlobHandle(handle.to_string()))?;
        Ok(BlobRecord {
            bytes: blob.bytes.clone(),
            meta: blob.meta.clone(),
        })
    }

    async fn delete(&self, handle: &BlobHandle) -> StorageResult<bool> {
        let Some(key) = handle.as_str().strip_prefix("blob:memory:") else {
            return Ok(false);
        };
        if let Some((_, blob)) = self.blobs.remove(key) {
            self.total_bytes
                .fetch_sub(blob.bytes.len() as u64, Ordering::AcqRel);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<BlobHandle>> {
        let mut handles: Vec<BlobHandle> = self
            .blobs
            .iter()
            .map(|entry| BlobHandle::new("memory", entry.key()))
            .filter(|h| prefix.is_none_or(|p| h.as_str().starts_with(p)))
            .collect();
        handles.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryBlobStore {
        MemoryBlobStore::new(1024, 4096)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = store();
        let handle = store
            .put(b"hello".to_vec(), BlobMeta::default())
            .await
            .unwrap();
        assert_eq!(handle.backend(), Some("memory"));

        let record = store.get(&handle).await.unwrap();
        assert_eq!(record.bytes, b"hello");
        assert!(record.meta.created_at.is_some());
    }

    #[tokio::test]
    async fn test_dedup_same_handle_no_double_charge() {
        let store = store();
        let h1 = store.put(b"same".to_vec(), BlobMeta::default()).await.unwrap();
        let h2 = store.put(b"same".to_vec(), BlobMeta::default()).await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 4);
    }

    #[tokio::test]
    async fn test_per_blob_quota() {
        let store = MemoryBlobStore::new(4, 4096);
        let result = store.put(vec![0u8; 5], BlobMeta::default()).await;
        assert!(matches!(
            result,
            Err(StorageError::BlobQuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_total_quota() {
        let store = MemoryBlobStore::new(1024, 6);
        store.put(vec![1u8; 4], BlobMeta::default()).await.unwrap();
        let result = store.put(vec![2u8; 4], BlobMeta::default()).await;
        assert!(matches!(
            result,
            Err(StorageError::BlobQuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_releases_quota() {
        let store = MemoryBlobStore::new(1024, 6);
        let handle = store.put(vec![1u8; 4], BlobMeta::default()).await.unwrap();
        assert!(store.delete(&handle).await.unwrap());
        assert_eq!(store.total_bytes(), 0);
        // Room again.
        store.put(vec![2u8; 4], BlobMeta::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let store = store();
        let bogus = BlobHandle::new("memory", "deadbeef");
        assert!(matches!(
            store.get(&bogus).await,
            Err(StorageError::UnknownBlobHandle(_))
        ));
        let foreign = BlobHandle::new("s3", "key");
        assert!(matches!(
            store.get(&foreign).await,
            Err(StorageError::UnknownBlobHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = store();
        store.put(b"a".to_vec(), BlobMeta::default()).await.unwrap();
        store.put(b"b".to_vec(), BlobMeta::default()).await.unwrap();
        let handles = store.list(None).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert!(handles[0].as_str() < handles[1].as_str());
    }
}
