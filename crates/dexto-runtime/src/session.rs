//! The per-session orchestrator: state machine, run loop, queue,
//! cancellation.

use dexto_core::{CancelToken, RunId, SessionId, Timestamp};
use dexto_events::{AgentEvent, ChunkKind};
use dexto_llm::{
    AssistantTurn, LlmCallOptions, LlmError, LlmRequest, Message, ResponseAssembler, StreamEvent,
    estimate_tokens, trim_to_window,
};
use dexto_logger::Logger;
use dexto_plugins::{LlmRequestPayload, PluginContext};
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::services::SessionServices;
use crate::state::{QueuedMessage, RunOutcome, RunState};
use crate::store::SessionRecord;

/// System message appended when a run is interrupted.
const INTERRUPTED_NOTICE: &str = "Interrupted — what should Dexto do next?";

/// How one run loop ended.
enum LoopEnd {
    /// Final assistant response, no pending tool calls.
    Done,
    /// Iteration cap reached; truncation already recorded.
    MaxIterations,
    /// Cancellation observed.
    Cancelled,
}

/// One conversation: the only writer of its message history at runtime.
pub struct ChatSession {
    id: SessionId,
    services: Arc<SessionServices>,
    logger: Logger,
    /// Single-writer guard: `run`, `reset_conversation`, and
    /// session-scoped swaps serialize here. Reads do not.
    run_mutex: tokio::sync::Mutex<()>,
    state: RwLock<RunState>,
    current_run: RwLock<Option<(RunId, CancelToken)>>,
    history: RwLock<Vec<Message>>,
    record: RwLock<SessionRecord>,
    queue: std::sync::Mutex<VecDeque<QueuedMessage>>,
}

impl ChatSession {
    /// Create a fresh session.
    #[must_use]
    pub fn new(id: SessionId, services: Arc<SessionServices>) -> Arc<Self> {
        let logger = services
            .logger
            .child("session", [("session_id".to_owned(), json!(id.to_string()))]);
        Arc::new(Self {
            record: RwLock::new(SessionRecord::new(id.clone())),
            id,
            services,
            logger,
            run_mutex: tokio::sync::Mutex::new(()),
            state: RwLock::new(RunState::Idle),
            current_run: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            queue: std::sync::Mutex::new(VecDeque::new()),
        })
    }

    /// Rehydrate a session from storage.
    #[must_use]
    pub fn from_storage(
        record: SessionRecord,
        messages: Vec<Message>,
        services: Arc<SessionServices>,
    ) -> Arc<Self> {
        let id = record.session_id.clone();
        let logger = services
            .logger
            .child("session", [("session_id".to_owned(), json!(id.to_string()))]);
        Arc::new(Self {
            id,
            services,
            logger,
            run_mutex: tokio::sync::Mutex::new(()),
            state: RwLock::new(RunState::Idle),
            current_run: RwLock::new(None),
            history: RwLock::new(messages),
            record: RwLock::new(record),
            queue: std::sync::Mutex::new(VecDeque::new()),
        })
    }

    /// This session's id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current run state.
    pub async fn run_state(&self) -> RunState {
        *self.state.read().await
    }

    /// Snapshot of the message history.
    pub async fn history(&self) -> Vec<Message> {
        self.history.read().await.clone()
    }

    /// Snapshot of the session metadata.
    pub async fn record(&self) -> SessionRecord {
        self.record.read().await.clone()
    }

    /// Last activity time, for eviction ordering.
    pub async fn last_activity(&self) -> Timestamp {
        self.record.read().await.last_activity_at
    }

    /// Number of queued messages.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Drain the queue, returning the messages to the caller.
    #[must_use]
    pub fn clear_queue(&self) -> Vec<QueuedMessage> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Set the session title, persist it, and notify subscribers.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn set_title(&self, title: impl Into<String>) -> RuntimeResult<()> {
        let title = title.into();
        {
            let mut record = self.record.write().await;
            record.title = Some(title.clone());
            self.services.store.save_record(&record).await?;
        }
        self.services.bus.publish(AgentEvent::SessionTitleUpdated {
            session_id: self.id.clone(),
            title,
        });
        Ok(())
    }

    /// Run one user turn.
    ///
    /// If a run is already in flight the input is enqueued (FIFO, bounded)
    /// and [`RunOutcome::Queued`] is returned; the active run drains the
    /// queue on completion and continues with the coalesced content.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::QueueFull`] when the queue is at capacity,
    /// and whatever aborts a run (blocking plugin failure, stream failure,
    /// storage failure). Cancellation is not an error: the outcome carries
    /// `cancelled: true`.
    pub async fn run(self: &Arc<Self>, input: impl Into<String>) -> RuntimeResult<RunOutcome> {
        let input = input.into();
        let Ok(guard) = self.run_mutex.try_lock() else {
            return self.enqueue(input);
        };

        // Queue monotonicity: messages left over from an earlier
        // (cancelled) run are replayed before the new input.
        let mut pending = match self.drain_coalesced() {
            Some(earlier) => format!("{earlier}\n\n{input}"),
            None => input,
        };

        let mut last;
        loop {
            last = self.run_one(pending).await?;
            if matches!(last, RunOutcome::Completed { cancelled: true, .. }) {
                // Cancel leaves the queue in place; `clear_queue` is the
                // explicit return-to-caller primitive.
                break;
            }
            match self.drain_coalesced() {
                Some(next) => pending = next,
                None => break,
            }
        }

        drop(guard);
        Ok(last)
    }

    /// Request cancellation of the current run. Idempotent; a no-op when
    /// the session is idle.
    pub async fn cancel(self: &Arc<Self>) {
        let current = self.current_run.read().await.clone();
        let Some((run_id, token)) = current else {
            return;
        };
        if token.is_cancelled() {
            return;
        }
        debug!(session_id = %self.id, %run_id, "Cancelling run");
        *self.state.write().await = RunState::Cancelling;
        token.cancel();
        self.services.approvals.cancel_session(&self.id);
        self.spawn_grace_watchdog(run_id);
    }

    /// Force the session idle if cancellation does not land within the
    /// grace window; the straggler's eventual result is discarded.
    fn spawn_grace_watchdog(self: &Arc<Self>, run_id: RunId) {
        let session = Arc::downgrade(self);
        let grace = Duration::from_millis(self.services.session_config.cancel_grace_ms);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(session) = session.upgrade() else {
                return;
            };
            let still_running = {
                let current = session.current_run.read().await;
                matches!(&*current, Some((id, _)) if *id == run_id)
            };
            if still_running {
                warn!(
                    session_id = %session.id,
                    %run_id,
                    "Cancellation grace window elapsed, forcing idle; orphaned call result will be discarded"
                );
                *session.state.write().await = RunState::Idle;
                *session.current_run.write().await = None;
            }
        });
    }

    /// Clear history and remembered approvals under the session lock.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn reset_conversation(self: &Arc<Self>) -> RuntimeResult<()> {
        let _guard = self.run_mutex.lock().await;
        self.history.write().await.clear();
        self.services.store.clear_messages(&self.id).await?;
        {
            let mut record = self.record.write().await;
            record.message_count = 0;
            record.last_activity_at = Timestamp::now();
            self.services.store.save_record(&record).await?;
        }
        self.services.approvals.forget_session(&self.id);
        self.services.bus.publish(AgentEvent::ConversationReset {
            session_id: self.id.clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn enqueue(&self, input: String) -> RuntimeResult<RunOutcome> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let capacity = self.services.session_config.max_queued;
        if queue.len() >= capacity {
            return Err(RuntimeError::QueueFull {
                session_id: self.id.clone(),
                capacity,
            });
        }
        queue.push_back(QueuedMessage::new(self.id.clone(), input));
        Ok(RunOutcome::Queued {
            position: queue.len(),
        })
    }

    fn drain_coalesced(&self) -> Option<String> {
        let drained = self.clear_queue();
        if drained.is_empty() {
            return None;
        }
        Some(
            drained
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }

    async fn set_state(&self, state: RunState) {
        *self.state.write().await = state;
    }

    async fn plugin_ctx(&self) -> PluginContext {
        PluginContext {
            session_id: self.id.clone(),
            user_id: None,
            logger: self.logger.clone(),
            event_bus: Arc::clone(&self.services.bus),
            agent: self.services.agent.read().await.clone(),
        }
    }

    async fn append_and_persist(&self, message: Message) -> RuntimeResult<()> {
        let seq = {
            let mut record = self.record.write().await;
            let seq = record.message_count;
            record.message_count += 1;
            record.last_activity_at = Timestamp::now();
            self.services.store.save_record(&record).await?;
            seq
        };
        self.services
            .store
            .append_message(&self.id, seq, &message)
            .await?;
        self.history.write().await.push(message);
        Ok(())
    }

    async fn run_one(&self, input: String) -> RuntimeResult<RunOutcome> {
        let run_id = RunId::new();
        let cancel = CancelToken::new();
        *self.current_run.write().await = Some((run_id, cancel.clone()));

        let result = self.run_iterations(&input, &cancel).await;

        match result {
            Ok((LoopEnd::Done | LoopEnd::MaxIterations, final_text)) => {
                self.finish_run().await;
                Ok(RunOutcome::Completed {
                    response: final_text,
                    cancelled: false,
                })
            },
            Ok((LoopEnd::Cancelled, final_text)) => {
                self.repair_unanswered_tool_calls().await?;
                self.append_and_persist(Message::system(self.id.clone(), INTERRUPTED_NOTICE))
                    .await?;
                cancel.acknowledge();
                self.finish_run().await;
                Ok(RunOutcome::Completed {
                    response: final_text,
                    cancelled: true,
                })
            },
            Err(e) => {
                self.services.bus.publish(AgentEvent::LlmError {
                    session_id: self.id.clone(),
                    code: e.code().to_owned(),
                    message: e.to_string(),
                });
                self.finish_run().await;
                Err(e)
            },
        }
    }

    async fn finish_run(&self) {
        *self.current_run.write().await = None;
        self.set_state(RunState::Idle).await;
    }

    async fn run_iterations(
        &self,
        input: &str,
        cancel: &CancelToken,
    ) -> RuntimeResult<(LoopEnd, String)> {
        self.set_state(RunState::Thinking).await;
        self.services.bus.publish(AgentEvent::LlmThinking {
            session_id: self.id.clone(),
        });
        self.append_and_persist(Message::user_text(self.id.clone(), input))
            .await?;

        let limits = *self.services.llm_limits.read().await;
        let plugin_ctx = self.plugin_ctx().await;
        let mut final_text = String::new();
        let mut iteration: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok((LoopEnd::Cancelled, final_text));
            }
            if iteration >= limits.max_iterations {
                self.services.bus.publish(AgentEvent::LlmError {
                    session_id: self.id.clone(),
                    code: "MaxIterations".to_owned(),
                    message: format!("run exceeded {} iterations", limits.max_iterations),
                });
                self.append_and_persist(Message::system(
                    self.id.clone(),
                    format!(
                        "Run truncated after {} iterations without a final response.",
                        limits.max_iterations
                    ),
                ))
                .await?;
                return Ok((LoopEnd::MaxIterations, final_text));
            }
            iteration += 1;

            // Compose the model request.
            let client = self.services.llm().await;
            let system = self.services.prompt.read().await.compose().await;
            let tools = self.services.tools.catalogue().await;
            let history = self.history.read().await.clone();
            let messages = trim_to_window(
                &history,
                limits.max_input_tokens,
                limits.headroom,
                estimate_tokens,
            );

            let payload = LlmRequestPayload { messages, tools };
            let (payload, short_circuit) = self
                .services
                .plugins
                .before_llm_request(payload, &plugin_ctx)
                .await?;

            let turn = match short_circuit {
                Some(turn) => turn,
                None => {
                    self.set_state(RunState::Streaming).await;
                    match self.stream_turn(&client, &system, &payload, cancel).await {
                        Ok(turn) => turn,
                        Err(LlmError::Cancelled) => {
                            return Ok((LoopEnd::Cancelled, final_text));
                        },
                        Err(e) => return Err(e.into()),
                    }
                },
            };

            let turn = self
                .services
                .plugins
                .before_response(turn, &plugin_ctx)
                .await?;

            let usage = turn.usage;
            self.append_and_persist(Message::assistant(
                self.id.clone(),
                turn.content.clone(),
                turn.tool_calls.clone(),
                usage,
            ))
            .await?;
            self.services.bus.publish(AgentEvent::LlmResponse {
                session_id: self.id.clone(),
                content: turn.content.clone(),
                input_tokens: usage.map(|u| u.input_tokens),
                output_tokens: usage.map(|u| u.output_tokens),
            });
            final_text = turn.content.clone();

            if turn.tool_calls.is_empty() {
                return Ok((LoopEnd::Done, final_text));
            }

            // Execute the requested tool calls, order preserved.
            self.set_state(RunState::ToolCalling).await;
            let mut interrupted = false;
            for call in &turn.tool_calls {
                if interrupted || cancel.is_cancelled() {
                    interrupted = true;
                    self.append_and_persist(Message::tool_result(
                        self.id.clone(),
                        call.id.clone(),
                        call.name.clone(),
                        Value::String("Cancelled".to_owned()),
                        true,
                    ))
                    .await?;
                    continue;
                }
                let result = self
                    .services
                    .tools
                    .execute(call, Some(&self.id), cancel, &plugin_ctx)
                    .await?;
                self.append_and_persist(Message::tool_result(
                    self.id.clone(),
                    call.id.clone(),
                    call.name.clone(),
                    result.result,
                    result.is_error,
                ))
                .await?;
            }
            if interrupted || cancel.is_cancelled() {
                return Ok((LoopEnd::Cancelled, final_text));
            }

            self.set_state(RunState::Thinking).await;
            self.services.bus.publish(AgentEvent::LlmThinking {
                session_id: self.id.clone(),
            });
        }
    }

    async fn stream_turn(
        &self,
        client: &Arc<dyn dexto_llm::LlmClient>,
        system: &str,
        payload: &LlmRequestPayload,
        cancel: &CancelToken,
    ) -> Result<AssistantTurn, LlmError> {
        let request = LlmRequest {
            system,
            messages: &payload.messages,
            tools: &payload.tools,
            options: LlmCallOptions::default(),
        };
        let mut stream = client.stream(request, cancel).await?;
        let mut assembler = ResponseAssembler::new();

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let event = event?;
            match &event {
                StreamEvent::TextDelta(text) => {
                    self.services.bus.publish(AgentEvent::LlmChunk {
                        session_id: self.id.clone(),
                        kind: ChunkKind::Token,
                        content: text.clone(),
                        is_complete: false,
                    });
                },
                StreamEvent::ThinkingDelta(text) => {
                    self.services.bus.publish(AgentEvent::LlmChunk {
                        session_id: self.id.clone(),
                        kind: ChunkKind::Thinking,
                        content: text.clone(),
                        is_complete: false,
                    });
                },
                StreamEvent::ToolCallDelta { args_delta, .. } => {
                    self.services.bus.publish(AgentEvent::LlmChunk {
                        session_id: self.id.clone(),
                        kind: ChunkKind::ToolDelta,
                        content: args_delta.clone(),
                        is_complete: false,
                    });
                },
                _ => {},
            }
            assembler.push(event)?;
            if assembler.is_done() {
                break;
            }
        }

        Ok(assembler.finish())
    }

    /// After cancellation, every assistant tool call must still have a
    /// matching tool message. Synthesize cancelled results for the gap.
    async fn repair_unanswered_tool_calls(&self) -> RuntimeResult<()> {
        let unanswered: Vec<(dexto_core::ToolCallId, String)> = {
            let history = self.history.read().await;
            let mut answered: HashSet<String> = HashSet::new();
            for message in history.iter() {
                if let dexto_llm::MessagePayload::Tool { tool_call_id, .. } = &message.payload {
                    answered.insert(tool_call_id.as_str().to_owned());
                }
            }
            history
                .iter()
                .flat_map(|m| m.tool_calls().iter())
                .filter(|call| !answered.contains(call.id.as_str()))
                .map(|call| (call.id.clone(), call.name.clone()))
                .collect()
        };

        for (call_id, name) in unanswered {
            self.append_and_persist(Message::tool_result(
                self.id.clone(),
                call_id,
                name,
                Value::String("Cancelled".to_owned()),
                true,
            ))
            .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
