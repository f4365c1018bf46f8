//! Storage error types.

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend connection failed or was lost.
    #[error("storage connection error: {0}")]
    Connection(String),

    /// A read or write failed.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A value could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// The operation is not supported by this backend variant.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        /// Backend name (e.g. `in-memory`).
        backend: String,
        /// The unsupported operation (e.g. `query`).
        operation: String,
    },

    /// No builder is installed for the configured backend.
    #[error("no {kind} backend registered for variant {variant}")]
    BackendUnavailable {
        /// Which store (`database`, `cache`, `blob`).
        kind: String,
        /// The configured variant tag.
        variant: String,
    },

    /// A blob put would exceed the configured quota.
    #[error("blob quota exceeded: {reason}")]
    BlobQuotaExceeded {
        /// Which quota and by how much.
        reason: String,
    },

    /// The blob handle is unknown or malformed.
    #[error("unknown blob handle: {0}")]
    UnknownBlobHandle(String),

    /// A transaction callback failed; the transaction was rolled back.
    #[error("transaction rolled back: {0}")]
    TransactionRolledBack(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
