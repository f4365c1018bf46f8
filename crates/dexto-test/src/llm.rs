//! Scripted LLM client.

use async_trait::async_trait;
use dexto_core::CancelToken;
use dexto_llm::{
    EventStream, LlmClient, LlmError, LlmRequest, LlmResult, Message, ModelFeatures, ModelInfo,
    StreamEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted assistant turn.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    /// Events yielded for this turn, in order.
    pub events: Vec<StreamEvent>,
    /// Delay before each event (simulates network pacing).
    pub event_delay: Duration,
}

impl ScriptedTurn {
    /// A turn from raw events with no pacing.
    #[must_use]
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            event_delay: Duration::ZERO,
        }
    }

    /// A plain text turn: one `TextDelta` per chunk, then `Done`.
    #[must_use]
    pub fn text(chunks: &[&str]) -> Self {
        let mut events: Vec<StreamEvent> = chunks
            .iter()
            .map(|c| StreamEvent::TextDelta((*c).to_owned()))
            .collect();
        events.push(StreamEvent::Done);
        Self::from_events(events)
    }

    /// A turn that requests one tool call with complete arguments.
    #[must_use]
    pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> Self {
        Self::from_events(vec![
            StreamEvent::ToolCallStart {
                id: id.to_owned(),
                name: name.to_owned(),
            },
            StreamEvent::ToolCallDelta {
                id: id.to_owned(),
                args_delta: args.to_string(),
            },
            StreamEvent::ToolCallEnd { id: id.to_owned() },
            StreamEvent::Done,
        ])
    }

    /// Space events apart by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }
}

/// LLM client that plays back a fixed sequence of scripted turns.
///
/// The `n`-th `stream` call plays the `n`-th script; calls past the end
/// fail with a provider error. Requests are recorded for assertions.
pub struct ScriptedLlmClient {
    scripts: Vec<ScriptedTurn>,
    next: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
    info: ModelInfo,
}

impl ScriptedLlmClient {
    /// Create a client from scripts.
    #[must_use]
    pub fn new(scripts: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            next: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            info: ModelInfo {
                provider: "scripted".to_owned(),
                model: "scripted-1".to_owned(),
                features: ModelFeatures {
                    tool_use: true,
                    streaming: true,
                    images: false,
                    structured: false,
                },
            },
        })
    }

    /// Override the advertised model identity.
    #[must_use]
    pub fn with_info(scripts: Vec<ScriptedTurn>, info: ModelInfo) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            next: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            info,
        })
    }

    /// How many `stream` calls have been made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    /// The message histories passed to each `stream` call.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn info(&self) -> ModelInfo {
        self.info.clone()
    }

    async fn stream(
        &self,
        request: LlmRequest<'_>,
        cancel: &CancelToken,
    ) -> LlmResult<EventStream> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.messages.to_vec());

        let Some(script) = self.scripts.get(index).cloned() else {
            return Err(LlmError::Provider {
                code: "script-exhausted".to_owned(),
                message: format!("no script for call {index}"),
            });
        };

        let cancel = cancel.clone();
        let delay = script.event_delay;
        let stream = futures::stream::unfold(
            (script.events.into_iter(), cancel, false),
            move |(mut events, cancel, cancelled)| async move {
                if cancelled {
                    return None;
                }
                if !delay.is_zero() {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = cancel.cancelled() => {
                            return Some((Err(LlmError::Cancelled), (events, cancel, true)));
                        },
                    }
                } else if cancel.is_cancelled() {
                    return Some((Err(LlmError::Cancelled), (events, cancel, true)));
                }
                events
                    .next()
                    .map(|event| (Ok(event), (events, cancel, false)))
            },
        );
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexto_llm::{LlmCallOptions, ResponseAssembler};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_text_turn() {
        let client = ScriptedLlmClient::new(vec![ScriptedTurn::text(&["Hello", " world", "!"])]);
        let mut stream = client
            .stream(
                LlmRequest {
                    system: "",
                    messages: &[],
                    tools: &[],
                    options: LlmCallOptions::default(),
                },
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let mut assembler = ResponseAssembler::new();
        while let Some(event) = stream.next().await {
            assembler.push(event.unwrap()).unwrap();
        }
        assert!(assembler.is_done());
        assert_eq!(assembler.finish().content, "Hello world!");
    }

    #[tokio::test]
    async fn test_script_exhaustion_errors() {
        let client = ScriptedLlmClient::new(vec![]);
        let result = client
            .stream(
                LlmRequest {
                    system: "",
                    messages: &[],
                    tools: &[],
                    options: LlmCallOptions::default(),
                },
                &CancelToken::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_paced_stream() {
        let client = ScriptedLlmClient::new(vec![
            ScriptedTurn::text(&["a", "b", "c", "d"]).with_delay(Duration::from_millis(50)),
        ]);
        let cancel = CancelToken::new();
        let mut stream = client
            .stream(
                LlmRequest {
                    system: "",
                    messages: &[],
                    tools: &[],
                    options: LlmCallOptions::default(),
                },
                &cancel,
            )
            .await
            .unwrap();

        let first = stream.next().await.unwrap();
        assert!(first.is_ok());
        cancel.cancel();

        let next = stream.next().await.unwrap();
        assert!(matches!(next, Err(LlmError::Cancelled)));
        assert!(stream.next().await.is_none());
    }
}
