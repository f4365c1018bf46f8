//! Session and message persistence through the storage contract.
//!
//! The runtime addresses storage through keys, never paths:
//!
//! - `session:{id}`: session metadata record
//! - `message:{id}:{seq:012}`: one message per key, scan-ordered
//!
//! Persistence order matches emission order: each message is written as
//! it is appended to the in-memory history.

use dexto_core::{SessionId, Timestamp};
use dexto_llm::Message;
use dexto_storage::{Database, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::RuntimeResult;

/// Persisted session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id.
    pub session_id: SessionId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last activity time.
    pub last_activity_at: Timestamp,
    /// Title, when one was set.
    pub title: Option<String>,
    /// Number of messages written (also the next sequence number).
    pub message_count: u64,
}

impl SessionRecord {
    /// Fresh record for a new session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        let now = Timestamp::now();
        Self {
            session_id,
            created_at: now,
            last_activity_at: now,
            title: None,
            message_count: 0,
        }
    }
}

/// Reads and writes sessions through the [`Database`] contract.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn Database>,
}

impl SessionStore {
    /// Create a store over a database handle.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    fn meta_key(session_id: &SessionId) -> String {
        format!("session:{session_id}")
    }

    fn message_key(session_id: &SessionId, seq: u64) -> String {
        format!("message:{session_id}:{seq:012}")
    }

    fn message_prefix(session_id: &SessionId) -> String {
        format!("message:{session_id}:")
    }

    /// Write session metadata.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn save_record(&self, record: &SessionRecord) -> RuntimeResult<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db.set(&Self::meta_key(&record.session_id), value).await?;
        Ok(())
    }

    /// Load session metadata.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn load_record(&self, session_id: &SessionId) -> RuntimeResult<Option<SessionRecord>> {
        let Some(value) = self.db.get(&Self::meta_key(session_id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    /// List all persisted session records.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn list_records(&self) -> RuntimeResult<Vec<SessionRecord>> {
        let entries = self.db.scan("session:").await?;
        let mut records = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let record: SessionRecord = serde_json::from_value(value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Append one message under the given sequence number.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn append_message(
        &self,
        session_id: &SessionId,
        seq: u64,
        message: &Message,
    ) -> RuntimeResult<()> {
        let value = serde_json::to_value(message)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db
            .set(&Self::message_key(session_id, seq), value)
            .await?;
        Ok(())
    }

    /// Load a session's messages in append order.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn load_messages(&self, session_id: &SessionId) -> RuntimeResult<Vec<Message>> {
        let entries = self.db.scan(&Self::message_prefix(session_id)).await?;
        let mut messages = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let message: Message = serde_json::from_value(value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }

    /// Delete a session's messages.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn clear_messages(&self, session_id: &SessionId) -> RuntimeResult<()> {
        let entries = self.db.scan(&Self::message_prefix(session_id)).await?;
        for (key, _) in entries {
            self.db.delete(&key).await?;
        }
        Ok(())
    }

    /// Delete a session entirely (metadata and messages).
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn delete_session(&self, session_id: &SessionId) -> RuntimeResult<()> {
        self.clear_messages(session_id).await?;
        self.db.delete(&Self::meta_key(session_id)).await?;
        Ok(())
    }

    /// Raw database access for sibling services (approval persistence).
    #[must_use]
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Arbitrary auxiliary value (queue snapshots, markers).
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn put_value(&self, key: &str, value: Value) -> RuntimeResult<()> {
        self.db.set(key, value).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
