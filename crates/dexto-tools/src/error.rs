//! Tool execution errors.

use thiserror::Error;

/// Errors produced while executing a tool.
///
/// These become structured error *results* on the tool message; the
/// [`ToolManager`](crate::ToolManager) never lets them abort a run.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No internal or MCP tool has this name.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The arguments do not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The referenced path does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The call was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The underlying MCP call failed.
    #[error(transparent)]
    Mcp(#[from] dexto_mcp::McpError),

    /// Elicitation or approval machinery was unavailable.
    #[error(transparent)]
    Approval(#[from] dexto_approval::ApprovalError),
}

/// Result type for tool execution.
pub type ToolResult<T> = Result<T, ToolError>;
