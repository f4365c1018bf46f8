//! Runtime error types.

use dexto_core::SessionId;
use thiserror::Error;

/// Errors surfaced by the runtime.
///
/// Tool-call and approval failures never appear here; they are captured
/// as data on tool messages by the tool pipeline. What escapes `run` is a
/// genuine abort: lifecycle misuse, blocking plugin failure, stream
/// failure, or storage failure.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid lifecycle state for {operation}: agent is {actual}")]
    Lifecycle {
        /// The operation attempted.
        operation: &'static str,
        /// The state the agent was in.
        actual: String,
    },

    /// The session has a run in flight and `force` was not supplied.
    #[error("session {0} has an active run")]
    BusyRun(SessionId),

    /// The session's message queue is full.
    #[error("message queue full for session {session_id} (capacity {capacity})")]
    QueueFull {
        /// The session whose queue overflowed.
        session_id: SessionId,
        /// The configured capacity.
        capacity: usize,
    },

    /// The session table is at capacity and nothing is evictable.
    #[error("session limit {limit} reached and every session is running")]
    SessionLimit {
        /// The configured limit.
        limit: usize,
    },

    /// The run hit its iteration cap.
    #[error("run exceeded {limit} iterations")]
    MaxIterations {
        /// The configured cap.
        limit: u32,
    },

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] dexto_config::ConfigError),

    /// A blocking plugin failed.
    #[error(transparent)]
    Plugin(#[from] dexto_plugins::PluginError),

    /// The LLM stream failed.
    #[error(transparent)]
    Llm(#[from] dexto_llm::LlmError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] dexto_storage::StorageError),

    /// Approval machinery failure (missing handler in manual mode).
    #[error(transparent)]
    Approval(#[from] dexto_approval::ApprovalError),

    /// MCP failure during lifecycle operations.
    #[error(transparent)]
    Mcp(#[from] dexto_mcp::McpError),

    /// Resource loading failure (reload from config source).
    #[error(transparent)]
    Resource(#[from] dexto_resources::ResourceError),
}

impl RuntimeError {
    /// Stable error code for event payloads and transports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lifecycle { .. } => "LifecycleError",
            Self::BusyRun(_) => "BusyRun",
            Self::QueueFull { .. } => "QueueFull",
            Self::SessionLimit { .. } => "SessionLimit",
            Self::MaxIterations { .. } => "MaxIterations",
            Self::Config(_) => "ConfigError",
            Self::Plugin(_) => "PluginError",
            Self::Llm(dexto_llm::LlmError::Cancelled) => "Cancelled",
            Self::Llm(dexto_llm::LlmError::Timeout { .. }) => "Timeout",
            Self::Llm(_) => "LlmError",
            Self::Storage(_) => "StorageError",
            Self::Approval(dexto_approval::ApprovalError::HandlerMissing) => {
                "ApprovalHandlerMissing"
            },
            Self::Approval(dexto_approval::ApprovalError::Persistence(_)) => "StorageError",
            Self::Mcp(_) => "McpTransportError",
            Self::Resource(_) => "ResourceError",
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
