//! Approval request, handler response, and outcome types.

use dexto_core::{ApprovalId, SessionId, Timestamp};
use dexto_events::{ApprovalKind, ApprovalStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A request handed to the registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id.
    pub approval_id: ApprovalId,
    /// Session the request belongs to, if session-scoped.
    pub session_id: Option<SessionId>,
    /// What is being asked.
    pub kind: ApprovalKind,
    /// Tool name for confirmations.
    pub tool_name: Option<String>,
    /// Tool arguments for confirmations.
    pub args: Option<Value>,
    /// Question text for elicitations.
    pub question: Option<String>,
    /// Deadline the manager enforces.
    pub timeout_ms: u64,
    /// When the request was created.
    pub created_at: Timestamp,
}

impl ApprovalRequest {
    /// Create a tool-confirmation request.
    #[must_use]
    pub fn tool_confirmation(
        session_id: Option<SessionId>,
        tool_name: impl Into<String>,
        args: Value,
        timeout_ms: u64,
    ) -> Self {
        Self {
            approval_id: ApprovalId::new(),
            session_id,
            kind: ApprovalKind::ToolConfirmation,
            tool_name: Some(tool_name.into()),
            args: Some(args),
            question: None,
            timeout_ms,
            created_at: Timestamp::now(),
        }
    }

    /// Create an elicitation request (`ask_user`).
    #[must_use]
    pub fn elicitation(
        session_id: Option<SessionId>,
        question: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            approval_id: ApprovalId::new(),
            session_id,
            kind: ApprovalKind::Elicitation,
            tool_name: None,
            args: None,
            question: Some(question.into()),
            timeout_ms,
            created_at: Timestamp::now(),
        }
    }
}

impl fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ApprovalKind::ToolConfirmation => write!(
                f,
                "{} tool_confirmation {}",
                self.approval_id,
                self.tool_name.as_deref().unwrap_or("?")
            ),
            ApprovalKind::Elicitation => write!(f, "{} elicitation", self.approval_id),
            ApprovalKind::Custom => write!(f, "{} custom", self.approval_id),
        }
    }
}

/// The verdict inside a handler response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum HandlerVerdict {
    /// The call may proceed.
    Approve,
    /// The call is refused.
    Deny {
        /// Reason shown to the model.
        reason: Option<String>,
    },
    /// The handler chose to cancel rather than decide.
    Cancel,
}

/// A handler's answer to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResponse {
    /// The verdict.
    pub verdict: HandlerVerdict,
    /// Remember this choice for the rest of the session.
    #[serde(default)]
    pub remember_choice: bool,
    /// Free-form answer for elicitations.
    pub answer: Option<String>,
}

impl HandlerResponse {
    /// One-time approval.
    #[must_use]
    pub fn approve() -> Self {
        Self {
            verdict: HandlerVerdict::Approve,
            remember_choice: false,
            answer: None,
        }
    }

    /// Denial with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            verdict: HandlerVerdict::Deny {
                reason: Some(reason.into()),
            },
            remember_choice: false,
            answer: None,
        }
    }

    /// Answer to an elicitation.
    #[must_use]
    pub fn answered(answer: impl Into<String>) -> Self {
        Self {
            verdict: HandlerVerdict::Approve,
            remember_choice: false,
            answer: Some(answer.into()),
        }
    }

    /// Remember this decision for the session.
    #[must_use]
    pub fn remembered(mut self) -> Self {
        self.remember_choice = true;
        self
    }
}

/// The settled outcome of one approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    /// Request id, when a pending entry was created (manual mode).
    pub approval_id: Option<ApprovalId>,
    /// Terminal status.
    pub status: ApprovalStatus,
    /// Denial reason, when one was given.
    pub reason: Option<String>,
    /// Elicitation answer, when one was given.
    pub answer: Option<String>,
}

impl ApprovalOutcome {
    /// Whether the call may proceed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    pub(crate) fn direct(status: ApprovalStatus) -> Self {
        Self {
            approval_id: None,
            status,
            reason: None,
            answer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_constructors() {
        let request = ApprovalRequest::tool_confirmation(
            Some(SessionId::from("s1")),
            "search",
            json!({"q": "x"}),
            5_000,
        );
        assert_eq!(request.kind, ApprovalKind::ToolConfirmation);
        assert_eq!(request.tool_name.as_deref(), Some("search"));
        assert!(request.to_string().contains("search"));

        let elicit = ApprovalRequest::elicitation(None, "Which branch?", 5_000);
        assert_eq!(elicit.kind, ApprovalKind::Elicitation);
        assert_eq!(elicit.question.as_deref(), Some("Which branch?"));
    }

    #[test]
    fn test_response_builders() {
        assert_eq!(HandlerResponse::approve().verdict, HandlerVerdict::Approve);
        assert!(HandlerResponse::approve().remembered().remember_choice);
        let deny = HandlerResponse::deny("too risky");
        assert!(matches!(deny.verdict, HandlerVerdict::Deny { .. }));
    }

    #[test]
    fn test_outcome_approved() {
        assert!(ApprovalOutcome::direct(ApprovalStatus::Approved).is_approved());
        assert!(!ApprovalOutcome::direct(ApprovalStatus::Denied).is_approved());
    }

    #[test]
    fn test_serde_roundtrip() {
        let response = HandlerResponse::deny("nope").remembered();
        let json = serde_json::to_string(&response).unwrap();
        let back: HandlerResponse = serde_json::from_str(&json).unwrap();
        assert!(back.remember_choice);
    }
}
