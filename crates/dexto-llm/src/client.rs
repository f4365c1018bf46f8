//! The LLM client contract.

use async_trait::async_trait;
use dexto_core::CancelToken;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

use crate::error::LlmResult;
use crate::message::{Message, estimate_tokens};

/// Streaming event emitted by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Partial assistant text.
    TextDelta(String),
    /// Partial reasoning text (providers with visible thinking).
    ThinkingDelta(String),
    /// A tool call started.
    ToolCallStart {
        /// Call id.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Partial tool-call arguments (JSON fragments).
    ToolCallDelta {
        /// Call id.
        id: String,
        /// Argument fragment.
        args_delta: String,
    },
    /// A tool call's arguments are complete.
    ToolCallEnd {
        /// Call id.
        id: String,
    },
    /// Usage report.
    Usage {
        /// Input tokens consumed.
        input_tokens: u64,
        /// Output tokens produced.
        output_tokens: u64,
    },
    /// The turn is complete.
    Done,
    /// The provider reported an error mid-stream.
    Error(String),
}

/// Boxed event stream returned by [`LlmClient::stream`].
pub type EventStream = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// Capabilities advertised by a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFeatures {
    /// Supports tool use.
    pub tool_use: bool,
    /// Supports streaming.
    pub streaming: bool,
    /// Accepts image content.
    pub images: bool,
    /// Supports structured output.
    pub structured: bool,
}

/// Identity and capabilities of the active model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider identifier.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Advertised capabilities.
    pub features: ModelFeatures,
}

/// A tool definition handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name in the aggregated namespace.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a tool definition with an open object schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct LlmCallOptions {
    /// Output token cap.
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Stream deadline.
    pub timeout: Option<Duration>,
}

/// One streaming request.
#[derive(Debug)]
pub struct LlmRequest<'a> {
    /// Composed system prompt.
    pub system: &'a str,
    /// Conversation history (already trimmed to the window).
    pub messages: &'a [Message],
    /// Tool catalogue.
    pub tools: &'a [ToolDefinition],
    /// Per-call options.
    pub options: LlmCallOptions,
}

/// Provider-agnostic LLM client.
///
/// Implementations are deterministic about turn boundaries: one `stream`
/// call produces at most one assistant turn, terminated by `Done` or
/// `Error`. The client MUST honour the [`CancelToken`]: on cancellation it
/// stops emitting and the stream yields [`LlmError::Cancelled`](crate::LlmError::Cancelled).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Identity and capabilities of the active model.
    fn info(&self) -> ModelInfo;

    /// Stream one assistant turn.
    async fn stream(
        &self,
        request: LlmRequest<'_>,
        cancel: &CancelToken,
    ) -> LlmResult<EventStream>;

    /// Count tokens in the given messages (used for window trimming).
    ///
    /// The default is the ~4-chars-per-token heuristic; providers with a
    /// real tokenizer should override.
    fn count_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(estimate_tokens).sum()
    }
}

/// Blanket implementation so `Box<dyn LlmClient>` can be used wherever a
/// concrete client is expected.
#[async_trait]
impl LlmClient for Box<dyn LlmClient> {
    fn info(&self) -> ModelInfo {
        (**self).info()
    }

    async fn stream(
        &self,
        request: LlmRequest<'_>,
        cancel: &CancelToken,
    ) -> LlmResult<EventStream> {
        (**self).stream(request, cancel).await
    }

    fn count_tokens(&self, messages: &[Message]) -> usize {
        (**self).count_tokens(messages)
    }
}
