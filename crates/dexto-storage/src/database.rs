//! Durable K/V + relational database contract and the in-memory variant.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};

/// Staged view of the store inside a transaction.
///
/// Reads see staged writes; nothing touches the backing store until the
/// callback returns `Ok` and the transaction commits.
pub struct Transaction<'a> {
    base: &'a BTreeMap<String, Value>,
    staged: BTreeMap<String, Option<Value>>,
}

impl Transaction<'_> {
    /// Read a key through the staged view.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None => self.base.get(key).cloned(),
        }
    }

    /// Stage a write.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.staged.insert(key.into(), Some(value));
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: &str) {
        self.staged.insert(key.to_owned(), None);
    }
}

/// Callback type for [`Database::transaction`].
pub type TransactionFn<'a> =
    Box<dyn FnOnce(&mut Transaction<'_>) -> StorageResult<()> + Send + 'a>;

/// Durable key/value store with an optional SQL surface.
///
/// Implementations must be safe for concurrent use from multiple sessions.
/// Variants without a SQL engine return [`StorageError::Unsupported`] from
/// `query`/`execute` but still provide the serializable `transaction`
/// primitive over the K/V surface.
#[async_trait]
pub trait Database: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Write a key.
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Run a SQL query (SQL-capable variants only).
    async fn query(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Value>>;

    /// Run a SQL statement (SQL-capable variants only). Returns affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> StorageResult<u64>;

    /// Run `f` inside a serializable transaction.
    ///
    /// The callback sees a consistent snapshot plus its own staged writes.
    /// If it returns `Err`, nothing is applied and the error is surfaced as
    /// [`StorageError::TransactionRolledBack`].
    async fn transaction(&self, f: TransactionFn<'_>) -> StorageResult<()>;
}

/// In-process, non-durable database.
///
/// A single `RwLock` over an ordered map. The write lock held for the whole
/// of `transaction` gives serializability for free.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryDatabase {
    /// Create an empty in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Value)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> StorageResult<Vec<Value>> {
        Err(StorageError::Unsupported {
            backend: "in-memory".to_owned(),
            operation: "query".to_owned(),
        })
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> StorageResult<u64> {
        Err(StorageError::Unsupported {
            backend: "in-memory".to_owned(),
            operation: "execute".to_owned(),
        })
    }

    async fn transaction(&self, f: TransactionFn<'_>) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        let mut tx = Transaction {
            base: &entries,
            staged: BTreeMap::new(),
        };
        match f(&mut tx) {
            Ok(()) => {
                let staged = tx.staged;
                for (key, value) in staged {
                    match value {
                        Some(v) => {
                            entries.insert(key, v);
                        },
                        None => {
                            entries.remove(&key);
                        },
                    }
                }
                Ok(())
            },
            Err(e) => Err(StorageError::TransactionRolledBack(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_delete() {
        let db = MemoryDatabase::new();
        assert_eq!(db.get("a").await.unwrap(), None);

        db.set("a", json!(1)).await.unwrap();
        assert_eq!(db.get("a").await.unwrap(), Some(json!(1)));

        assert!(db.delete("a").await.unwrap());
        assert!(!db.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_ordering() {
        let db = MemoryDatabase::new();
        db.set("session:b", json!(2)).await.unwrap();
        db.set("session:a", json!(1)).await.unwrap();
        db.set("other:c", json!(3)).await.unwrap();

        let entries = db.scan("session:").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("session:a".to_owned(), json!(1)),
                ("session:b".to_owned(), json!(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_sql_unsupported() {
        let db = MemoryDatabase::new();
        assert!(matches!(
            db.query("SELECT 1", &[]).await,
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let db = MemoryDatabase::new();
        db.set("x", json!(1)).await.unwrap();

        db.transaction(Box::new(|tx| {
            let current = tx.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
            tx.set("x", json!(current + 1));
            tx.set("y", json!("new"));
            Ok(())
        }))
        .await
        .unwrap();

        assert_eq!(db.get("x").await.unwrap(), Some(json!(2)));
        assert_eq!(db.get("y").await.unwrap(), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = MemoryDatabase::new();
        db.set("x", json!(1)).await.unwrap();

        let result = db
            .transaction(Box::new(|tx| {
                tx.set("x", json!(99));
                tx.delete("x");
                Err(StorageError::Io("simulated".to_owned()))
            }))
            .await;

        assert!(matches!(
            result,
            Err(StorageError::TransactionRolledBack(_))
        ));
        assert_eq!(db.get("x").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_transaction_reads_staged_writes() {
        let db = MemoryDatabase::new();
        db.transaction(Box::new(|tx| {
            tx.set("k", json!("v"));
            assert_eq!(tx.get("k"), Some(json!("v")));
            tx.delete("k");
            assert_eq!(tx.get("k"), None);
            Ok(())
        }))
        .await
        .unwrap();
        assert_eq!(db.get("k").await.unwrap(), None);
    }
}
