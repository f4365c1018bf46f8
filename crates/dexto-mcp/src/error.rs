//! MCP error types.

use thiserror::Error;

/// Errors surfaced by the MCP layer.
#[derive(Debug, Error)]
pub enum McpError {
    /// No connection is registered under this name.
    #[error("unknown MCP server: {0}")]
    ServerNotFound(String),

    /// The named tool exists on no connected server.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Two servers expose the same tool name.
    #[error("tool {tool} from {second} conflicts with {first}; keeping {first}")]
    ToolConflict {
        /// The conflicting tool name.
        tool: String,
        /// The server that registered first (kept).
        first: String,
        /// The later server (shadowed).
        second: String,
    },

    /// The transport failed (connection lost, protocol error).
    #[error("MCP transport error on {server}: {message}")]
    Transport {
        /// The server involved.
        server: String,
        /// Underlying message.
        message: String,
    },

    /// A call was aborted by disconnect or cancellation.
    #[error("MCP call aborted on {server}")]
    ToolAborted {
        /// The server involved.
        server: String,
    },

    /// A call exceeded its deadline.
    #[error("MCP call timed out on {server} after {timeout_ms}ms")]
    Timeout {
        /// The server involved.
        server: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// A strict-mode connection is in the error state.
    #[error("MCP server {server} is in error state (strict mode)")]
    StrictModeAborted {
        /// The server involved.
        server: String,
    },

    /// The initial connection attempt failed.
    #[error("failed to connect MCP server {server}: {message}")]
    ConnectionFailed {
        /// The server involved.
        server: String,
        /// Underlying message.
        message: String,
    },
}

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;
