//! Approval handler test doubles.

use async_trait::async_trait;
use dexto_approval::{ApprovalHandler, ApprovalRequest, HandlerResponse};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Handler that answers every request with the same response, optionally
/// after a delay.
pub struct StaticApprovalHandler {
    response: HandlerResponse,
    delay: Duration,
    seen: Mutex<Vec<ApprovalRequest>>,
}

impl StaticApprovalHandler {
    /// Always answer with `response`.
    #[must_use]
    pub fn new(response: HandlerResponse) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Approve everything.
    #[must_use]
    pub fn approving() -> Self {
        Self::new(HandlerResponse::approve())
    }

    /// Deny everything.
    #[must_use]
    pub fn denying(reason: &str) -> Self {
        Self::new(HandlerResponse::deny(reason))
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests seen so far.
    #[must_use]
    pub fn seen(&self) -> Vec<ApprovalRequest> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of requests seen so far.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ApprovalHandler for StaticApprovalHandler {
    async fn handle(&self, request: ApprovalRequest) -> HandlerResponse {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.clone()
    }
}

/// Handler driven by the test through a channel: each request pops the
/// next queued response, waiting until the test supplies one.
pub struct ChannelApprovalHandler {
    responses: tokio::sync::Mutex<mpsc::UnboundedReceiver<HandlerResponse>>,
}

impl ChannelApprovalHandler {
    /// Create the handler and the sender the test feeds responses with.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<HandlerResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                responses: tokio::sync::Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl ApprovalHandler for ChannelApprovalHandler {
    async fn handle(&self, _request: ApprovalRequest) -> HandlerResponse {
        let mut rx = self.responses.lock().await;
        match rx.recv().await {
            Some(response) => response,
            // Sender dropped: behave like a silent handler.
            None => {
                std::future::pending::<()>().await;
                HandlerResponse::approve()
            },
        }
    }
}
