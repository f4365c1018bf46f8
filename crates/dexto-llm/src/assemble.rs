//! Folding a provider stream into one assistant turn.

use serde_json::Value;

use crate::client::StreamEvent;
use crate::error::{LlmError, LlmResult};
use crate::message::{TokenUsage, ToolCall};

/// The assembled result of one streamed assistant turn.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    /// Assistant text.
    pub content: String,
    /// Accumulated reasoning text, when the provider surfaces it.
    pub thinking: String,
    /// Requested tool calls, in arrival order.
    pub tool_calls: Vec<ToolCall>,
    /// Usage, when reported.
    pub usage: Option<TokenUsage>,
}

impl AssistantTurn {
    /// Whether the turn requested any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Folds [`StreamEvent`]s into an [`AssistantTurn`].
///
/// Tool-call arguments arrive as JSON fragments between `ToolCallStart`
/// and `ToolCallEnd`; the assembler buffers the fragments per call and
/// parses them when the call closes.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    turn: AssistantTurn,
    pending_args: Vec<(String, String)>,
    done: bool,
}

impl ResponseAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `Done` event has been observed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one event.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Streaming`] for provider-reported stream errors
    /// and [`LlmError::InvalidResponse`] when a closed tool call's
    /// buffered arguments are not valid JSON.
    pub fn push(&mut self, event: StreamEvent) -> LlmResult<()> {
        match event {
            StreamEvent::TextDelta(text) => self.turn.content.push_str(&text),
            StreamEvent::ThinkingDelta(text) => self.turn.thinking.push_str(&text),
            StreamEvent::ToolCallStart { id, name } => {
                self.turn
                    .tool_calls
                    .push(ToolCall::new(id.as_str(), name, Value::Null));
                self.pending_args.push((id, String::new()));
            },
            StreamEvent::ToolCallDelta { id, args_delta } => {
                if let Some((_, buf)) = self.pending_args.iter_mut().find(|(pid, _)| *pid == id) {
                    buf.push_str(&args_delta);
                }
            },
            StreamEvent::ToolCallEnd { id } => {
                let buffered = self
                    .pending_args
                    .iter()
                    .position(|(pid, _)| *pid == id)
                    .map(|i| self.pending_args.remove(i));
                if let Some((_, buf)) = buffered {
                    let args: Value = if buf.trim().is_empty() {
                        Value::Object(serde_json::Map::new())
                    } else {
                        serde_json::from_str(&buf).map_err(|e| {
                            LlmError::InvalidResponse(format!(
                                "tool call {id} arguments are not valid JSON: {e}"
                            ))
                        })?
                    };
                    if let Some(call) = self
                        .turn
                        .tool_calls
                        .iter_mut()
                        .find(|c| c.id.as_str() == id)
                    {
                        call.args = args;
                    }
                }
            },
            StreamEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                self.turn.usage = Some(TokenUsage {
                    input_tokens,
                    output_tokens,
                });
            },
            StreamEvent::Done => self.done = true,
            StreamEvent::Error(message) => return Err(LlmError::Streaming(message)),
        }
        Ok(())
    }

    /// Finish assembly and take the turn.
    #[must_use]
    pub fn finish(self) -> AssistantTurn {
        self.turn
    }
}
