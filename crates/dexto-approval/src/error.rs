//! Approval error types.

use thiserror::Error;

/// Errors surfaced by the approval manager.
///
/// Denials, timeouts, and cancellations are *outcomes*, not errors; they
/// come back as [`ApprovalOutcome`](crate::ApprovalOutcome) data. Errors
/// here mean the manager could not run the decision at all.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// Manual mode with no registered handler.
    #[error("approval mode is manual but no approval handler is registered")]
    HandlerMissing,

    /// Persisting or loading remembered choices failed.
    #[error("approval cache persistence failed: {0}")]
    Persistence(#[from] dexto_storage::StorageError),
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
