//! LLM error types.

use dexto_core::Cancelled;
use thiserror::Error;

/// Errors surfaced by LLM clients.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The stream was cancelled cooperatively.
    #[error("llm stream cancelled")]
    Cancelled,

    /// The provider did not answer within the deadline.
    #[error("llm request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The stream broke mid-response.
    #[error("llm streaming error: {0}")]
    Streaming(String),

    /// The provider answered with an error.
    #[error("llm provider error ({code}): {message}")]
    Provider {
        /// Provider or HTTP error code.
        code: String,
        /// Provider message.
        message: String,
    },

    /// The response could not be interpreted (malformed tool args, etc.).
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

impl From<Cancelled> for LlmError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
