//! Conversation message model.
//!
//! Messages are owned by the session and persisted through storage; the
//! same shapes are fed back to the model on every iteration.

use dexto_core::{SessionId, Timestamp, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions (never trimmed).
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of one tool call.
    Tool,
}

/// One part of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image stored in the blob store.
    ImageRef {
        /// Opaque blob handle.
        handle: String,
        /// MIME type.
        media_type: String,
    },
    /// A file stored in the blob store.
    FileRef {
        /// Opaque blob handle.
        handle: String,
        /// Original file name, when known.
        name: Option<String>,
    },
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within the session until resolved.
    pub id: ToolCallId,
    /// Tool name in the aggregated namespace.
    pub name: String,
    /// Arguments as produced by the model.
    pub args: Value,
}

impl ToolCall {
    /// Create a tool call.
    #[must_use]
    pub fn new(id: impl Into<ToolCallId>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Token usage reported by the provider for one assistant turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Role-specific message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MessagePayload {
    /// End-user input.
    User {
        /// Content parts.
        content: Vec<UserContentPart>,
    },
    /// Model output.
    Assistant {
        /// Assistant text.
        content: String,
        /// Requested tool calls, in order.
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        /// Usage for this turn, when reported.
        token_usage: Option<TokenUsage>,
    },
    /// Result of one tool call.
    Tool {
        /// The call this answers.
        tool_call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Result payload (string or structured).
        result: Value,
        /// Whether the result is an error.
        #[serde(default)]
        is_error: bool,
    },
    /// Instructions.
    System {
        /// The text.
        content: String,
    },
}

/// One message in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// Owning session.
    pub session_id: SessionId,
    /// Creation time (ms precision).
    pub timestamp: Timestamp,
    /// Role-specific payload.
    #[serde(flatten)]
    pub payload: MessagePayload,
}

impl Message {
    fn new(session_id: SessionId, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Timestamp::now(),
            payload,
        }
    }

    /// Create a plain-text user message.
    #[must_use]
    pub fn user_text(session_id: SessionId, text: impl Into<String>) -> Self {
        Self::new(
            session_id,
            MessagePayload::User {
                content: vec![UserContentPart::Text { text: text.into() }],
            },
        )
    }

    /// Create a user message from parts.
    #[must_use]
    pub fn user_parts(session_id: SessionId, content: Vec<UserContentPart>) -> Self {
        Self::new(session_id, MessagePayload::User { content })
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(
        session_id: SessionId,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        token_usage: Option<TokenUsage>,
    ) -> Self {
        Self::new(
            session_id,
            MessagePayload::Assistant {
                content: content.into(),
                tool_calls,
                token_usage,
            },
        )
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool_result(
        session_id: SessionId,
        tool_call_id: ToolCallId,
        name: impl Into<String>,
        result: Value,
        is_error: bool,
    ) -> Self {
        Self::new(
            session_id,
            MessagePayload::Tool {
                tool_call_id,
                name: name.into(),
                result,
                is_error,
            },
        )
    }

    /// Create a system message.
    #[must_use]
    pub fn system(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(
            session_id,
            MessagePayload::System {
                content: content.into(),
            },
        )
    }

    /// This message's role.
    #[must_use]
    pub fn role(&self) -> MessageRole {
        match &self.payload {
            MessagePayload::User { .. } => MessageRole::User,
            MessagePayload::Assistant { .. } => MessageRole::Assistant,
            MessagePayload::Tool { .. } => MessageRole::Tool,
            MessagePayload::System { .. } => MessageRole::System,
        }
    }

    /// The assistant tool calls, when this is an assistant message with any.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.payload {
            MessagePayload::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The text content, when the payload carries plain text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::Assistant { content, .. } | MessagePayload::System { content } => {
                Some(content)
            },
            MessagePayload::User { content } => content.iter().find_map(|p| match p {
                UserContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            MessagePayload::Tool { .. } => None,
        }
    }
}

/// Rough token estimate for a message (~4 chars per token).
///
/// A heuristic for window trimming, not billing; providers report exact
/// usage on the stream.
#[must_use]
pub fn estimate_tokens(message: &Message) -> usize {
    let chars = match &message.payload {
        MessagePayload::User { content } => content
            .iter()
            .map(|p| match p {
                UserContentPart::Text { text } => text.len(),
                // Refs expand to provider-side attachments; charge a flat
                // envelope for the reference itself.
                UserContentPart::ImageRef { .. } | UserContentPart::FileRef { .. } => 400,
            })
            .sum(),
        MessagePayload::Assistant {
            content,
            tool_calls,
            ..
        } => content.len().saturating_add(
            tool_calls
                .iter()
                .map(|c| c.name.len().saturating_add(c.args.to_string().len()))
                .sum(),
        ),
        MessagePayload::Tool { result, .. } => result.to_string().len(),
        MessagePayload::System { content } => content.len(),
    };
    chars / 4 + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    #[test]
    fn test_roles() {
        assert_eq!(Message::user_text(sid(), "hi").role(), MessageRole::User);
        assert_eq!(
            Message::assistant(sid(), "hello", vec![], None).role(),
            MessageRole::Assistant
        );
        assert_eq!(
            Message::system(sid(), "rules").role(),
            MessageRole::System
        );
    }

    #[test]
    fn test_tool_calls_accessor() {
        let call = ToolCall::new(ToolCallId::new("c1"), "search", serde_json::json!({}));
        let msg = Message::assistant(sid(), "", vec![call.clone()], None);
        assert_eq!(msg.tool_calls(), &[call]);
        assert!(Message::user_text(sid(), "x").tool_calls().is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let msg = Message::tool_result(
            sid(),
            ToolCallId::new("c1"),
            "search",
            serde_json::json!({"hits": 3}),
            false,
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_estimate_tokens_scales_with_content() {
        let short = Message::user_text(sid(), "hi");
        let long = Message::user_text(sid(), "long ".repeat(200));
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
    }
}
