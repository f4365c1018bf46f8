//! Session run-state and queue types.

use dexto_core::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The per-session run-state machine.
///
/// `Idle → Thinking → Streaming → ToolCalling → (Thinking | Idle)`, with
/// `Cancelling` reachable from any active state and resolving to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// No run in progress.
    Idle,
    /// Composing the next model request.
    Thinking,
    /// Consuming the model stream.
    Streaming,
    /// Executing requested tool calls.
    ToolCalling,
    /// Cancellation requested; unwinding to idle.
    Cancelling,
}

impl RunState {
    /// Whether a run is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Streaming => "streaming",
            Self::ToolCalling => "toolCalling",
            Self::Cancelling => "cancelling",
        };
        f.write_str(s)
    }
}

/// A message held while a run is active, drained FIFO afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Unique id.
    pub id: Uuid,
    /// Owning session.
    pub session_id: SessionId,
    /// The user input.
    pub content: String,
    /// When the message was enqueued.
    pub enqueued_at: Timestamp,
}

impl QueuedMessage {
    /// Create a queued message.
    #[must_use]
    pub fn new(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            content: content.into(),
            enqueued_at: Timestamp::now(),
        }
    }
}

/// What `run` produced for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run completed (possibly by cancellation).
    Completed {
        /// The final assistant text (empty when cancelled before any
        /// assistant output).
        response: String,
        /// Whether the run was cancelled.
        cancelled: bool,
    },
    /// The session was busy; the input was queued and will be picked up
    /// by the active run's drain pass.
    Queued {
        /// Position in the queue (1-based).
        position: usize,
    },
}

impl RunOutcome {
    /// The response text, when the run completed.
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Completed { response, .. } => Some(response),
            Self::Queued { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_activity() {
        assert!(!RunState::Idle.is_active());
        assert!(RunState::Thinking.is_active());
        assert!(RunState::Cancelling.is_active());
        assert_eq!(RunState::ToolCalling.to_string(), "toolCalling");
    }

    #[test]
    fn test_queued_message() {
        let message = QueuedMessage::new(SessionId::from("s1"), "B");
        assert_eq!(message.content, "B");
        assert_ne!(
            message.id,
            QueuedMessage::new(SessionId::from("s1"), "C").id
        );
    }
}
