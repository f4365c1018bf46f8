//! Event types for the Dexto event bus.

use chrono::{DateTime, Utc};
use dexto_core::{AgentId, ApprovalId, SessionId, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Kind of a streamed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    /// Output token text.
    Token,
    /// Reasoning/thinking text.
    Thinking,
    /// Partial tool-call arguments.
    ToolDelta,
}

/// Kind of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// A tool call awaiting confirmation.
    ToolConfirmation,
    /// A free-form question escalated to the user (`ask_user`).
    Elicitation,
    /// A custom request raised by an extension.
    Custom,
}

/// Terminal status of an approval request.
///
/// `Pending` is the only non-terminal state; every request settles in
/// exactly one of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// The call may proceed.
    Approved,
    /// The call was refused.
    Denied,
    /// The surrounding run was cancelled.
    Cancelled,
    /// No decision arrived within the deadline.
    TimedOut,
}

impl ApprovalStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// All events published on the Dexto bus.
///
/// Each variant maps to one topic string (see [`AgentEvent::topic`]); the
/// variant fields are that topic's payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    // ========== LLM service ==========
    /// The model started working on a turn.
    LlmThinking {
        /// Session the run belongs to.
        session_id: SessionId,
    },

    /// A streamed chunk of model output.
    LlmChunk {
        /// Session the run belongs to.
        session_id: SessionId,
        /// What the chunk carries.
        kind: ChunkKind,
        /// Chunk text (or partial tool-call JSON for `ToolDelta`).
        content: String,
        /// Whether this is the final chunk of its group.
        is_complete: bool,
    },

    /// A complete assistant response.
    LlmResponse {
        /// Session the run belongs to.
        session_id: SessionId,
        /// Final assistant text.
        content: String,
        /// Input tokens consumed, when the provider reported usage.
        input_tokens: Option<u64>,
        /// Output tokens produced, when the provider reported usage.
        output_tokens: Option<u64>,
    },

    /// A run failed.
    LlmError {
        /// Session the run belongs to.
        session_id: SessionId,
        /// Stable error code (e.g. `MaxIterations`, `Timeout`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    // ========== Tool flow ==========
    /// A tool call is about to be dispatched.
    ToolCall {
        /// Session the call belongs to.
        session_id: SessionId,
        /// Id of the call within the assistant message.
        call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Arguments as produced by the model.
        args: Value,
    },

    /// A tool call finished.
    ToolResult {
        /// Session the call belongs to.
        session_id: SessionId,
        /// Id of the call within the assistant message.
        call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Result payload (string or structured).
        result: Value,
        /// Whether the result is an error.
        is_error: bool,
    },

    // ========== Approvals ==========
    /// An approval request entered `pending`.
    ApprovalRequest {
        /// Request id.
        approval_id: ApprovalId,
        /// Session the request belongs to, if session-scoped.
        session_id: Option<SessionId>,
        /// What is being asked.
        kind: ApprovalKind,
        /// Tool name for confirmations.
        tool_name: Option<String>,
        /// Tool arguments for confirmations.
        args: Option<Value>,
        /// Deadline for a decision.
        timeout_ms: u64,
    },

    /// An approval request settled.
    ApprovalResponse {
        /// Request id.
        approval_id: ApprovalId,
        /// Session the request belonged to, if session-scoped.
        session_id: Option<SessionId>,
        /// Terminal status.
        status: ApprovalStatus,
        /// Whether the decision was remembered for the session.
        remember_choice: Option<bool>,
    },

    // ========== Sessions ==========
    /// A session's history was cleared.
    ConversationReset {
        /// The session that was reset.
        session_id: SessionId,
    },

    /// A session title changed.
    SessionTitleUpdated {
        /// The session whose title changed.
        session_id: SessionId,
        /// The new title.
        title: String,
    },

    // ========== MCP ==========
    /// An MCP server reached `connected`.
    McpServerConnected {
        /// Server name.
        name: String,
        /// Number of tools the server exposes.
        tool_count: usize,
    },

    /// An MCP server was disconnected.
    McpServerDisconnected {
        /// Server name.
        name: String,
    },

    /// A resource changed on a connected server or data source.
    ResourceUpdated {
        /// Resource URI.
        uri: String,
    },

    // ========== Agent lifecycle ==========
    /// The agent finished starting.
    AgentStarted {
        /// Agent id.
        agent_id: AgentId,
    },

    /// The agent stopped.
    AgentStopped {
        /// Agent id.
        agent_id: AgentId,
        /// Reason for stopping, when one was given.
        reason: Option<String>,
    },
}

impl AgentEvent {
    /// The topic string for this event.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::LlmThinking { .. } => "llmservice:thinking",
            Self::LlmChunk { .. } => "llmservice:chunk",
            Self::LlmResponse { .. } => "llmservice:response",
            Self::LlmError { .. } => "llmservice:error",
            Self::ToolCall { .. } => "dexto:toolCall",
            Self::ToolResult { .. } => "dexto:toolResult",
            Self::ApprovalRequest { .. } => "dexto:approvalRequest",
            Self::ApprovalResponse { .. } => "dexto:approvalResponse",
            Self::ConversationReset { .. } => "dexto:conversationReset",
            Self::SessionTitleUpdated { .. } => "dexto:sessionTitleUpdated",
            Self::McpServerConnected { .. } => "dexto:mcpServerConnected",
            Self::McpServerDisconnected { .. } => "dexto:mcpServerDisconnected",
            Self::ResourceUpdated { .. } => "dexto:resourceUpdated",
            Self::AgentStarted { .. } => "dexto:agentStarted",
            Self::AgentStopped { .. } => "dexto:agentStopped",
        }
    }

    /// The session this event belongs to, when it is session-scoped.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::LlmThinking { session_id }
            | Self::LlmChunk { session_id, .. }
            | Self::LlmResponse { session_id, .. }
            | Self::LlmError { session_id, .. }
            | Self::ToolCall { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::ConversationReset { session_id }
            | Self::SessionTitleUpdated { session_id, .. } => Some(session_id),
            Self::ApprovalRequest { session_id, .. }
            | Self::ApprovalResponse { session_id, .. } => session_id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_strings() {
        let event = AgentEvent::LlmChunk {
            session_id: SessionId::from("s1"),
            kind: ChunkKind::Token,
            content: "hi".to_string(),
            is_complete: false,
        };
        assert_eq!(event.topic(), "llmservice:chunk");

        let event = AgentEvent::ApprovalRequest {
            approval_id: ApprovalId::new(),
            session_id: None,
            kind: ApprovalKind::ToolConfirmation,
            tool_name: Some("search".to_string()),
            args: None,
            timeout_ms: 120_000,
        };
        assert_eq!(event.topic(), "dexto:approvalRequest");
    }

    #[test]
    fn test_session_scoping() {
        let event = AgentEvent::ConversationReset {
            session_id: SessionId::from("s1"),
        };
        assert_eq!(event.session_id().map(SessionId::as_str), Some("s1"));

        let event = AgentEvent::McpServerConnected {
            name: "fs".to_string(),
            tool_count: 3,
        };
        assert!(event.session_id().is_none());
    }

    #[test]
    fn test_approval_status_terminality() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::TimedOut.is_terminal());
        assert_eq!(ApprovalStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::ToolResult {
            session_id: SessionId::from("s1"),
            call_id: ToolCallId::from("c1"),
            name: "search".to_string(),
            result: serde_json::json!({"hits": 2}),
            is_error: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic(), "dexto:toolResult");
    }
}
