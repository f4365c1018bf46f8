//! Cooperative cancellation.
//!
//! A [`CancelToken`] is handed to every suspension point of a run: LLM
//! stream reads, MCP tool calls, approval waits, storage I/O. Cancellation
//! is a request, not a preemption: the blocking operation observes the
//! token and unwinds on its own.
//!
//! The token has three observable states:
//!
//! - `Active`: no cancellation requested.
//! - `Cancelling`: [`CancelToken::cancel`] was called; holders are
//!   unwinding.
//! - `Cancelled`: the owner acknowledged that the operation reached a
//!   quiescent state ([`CancelToken::acknowledge`]).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error signalling that an operation was cancelled cooperatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Observable state of a [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    /// No cancellation requested.
    Active,
    /// Cancellation requested; holders are unwinding.
    Cancelling,
    /// The owner acknowledged quiescence.
    Cancelled,
}

const STATE_ACTIVE: u8 = 0;
const STATE_CANCELLING: u8 = 1;
const STATE_CANCELLED: u8 = 2;

type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    state: AtomicU8,
    token: CancellationToken,
    callbacks: Mutex<Vec<CancelCallback>>,
}

/// Cooperative cancellation token.
///
/// Cloning is cheap and shares state; any clone may request cancellation.
/// Cancellation is idempotent: repeated [`cancel`](Self::cancel) calls are
/// no-ops after the first.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a fresh, active token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CancelState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_CANCELLING => CancelState::Cancelling,
            STATE_CANCELLED => CancelState::Cancelled,
            _ => CancelState::Active,
        }
    }

    /// Whether cancellation has been requested (in either terminal-bound state).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != STATE_ACTIVE
    }

    /// Request cancellation.
    ///
    /// Transitions `Active → Cancelling`, wakes every task awaiting
    /// [`cancelled`](Self::cancelled), and runs the registered callbacks.
    /// Idempotent: later calls do nothing.
    pub fn cancel(&self) {
        let prev = self.inner.state.compare_exchange(
            STATE_ACTIVE,
            STATE_CANCELLING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if prev.is_err() {
            return;
        }
        self.inner.token.cancel();
        let callbacks = {
            let mut guard = self
                .inner
                .callbacks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for cb in callbacks {
            cb();
        }
    }

    /// Acknowledge that the cancelled operation reached quiescence.
    ///
    /// Transitions `Cancelling → Cancelled`. A no-op in any other state.
    pub fn acknowledge(&self) {
        let _ = self.inner.state.compare_exchange(
            STATE_CANCELLING,
            STATE_CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Bail out with [`Cancelled`] if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the token is no longer `Active`.
    pub fn throw_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Register a callback invoked once when cancellation is requested.
    ///
    /// If the token is already cancelled, the callback runs immediately on
    /// the calling thread.
    pub fn on_cancel(&self, f: impl FnOnce() + Send + 'static) {
        if self.is_cancelled() {
            f();
            return;
        }
        let mut guard = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Re-check under the lock: cancel() drains callbacks exactly once.
        if self.is_cancelled() {
            drop(guard);
            f();
        } else {
            guard.push(Box::new(f));
        }
    }

    /// Future that resolves when cancellation is requested.
    ///
    /// Suitable for `tokio::select!` arms at suspension points.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// The underlying `tokio_util` token, for APIs that take one directly
    /// (e.g. aborting an in-flight MCP request).
    #[must_use]
    pub fn raw(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_initial_state() {
        let token = CancelToken::new();
        assert_eq!(token.state(), CancelState::Active);
        assert!(!token.is_cancelled());
        assert!(token.throw_if_cancelled().is_ok());
    }

    #[test]
    fn test_cancel_transitions() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(token.state(), CancelState::Cancelling);
        assert_eq!(token.throw_if_cancelled(), Err(Cancelled));

        token.acknowledge();
        assert_eq!(token.state(), CancelState::Cancelled);
    }

    #[test]
    fn test_cancel_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        let c = Arc::clone(&count);
        token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel();
        token.cancel();
        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acknowledge_requires_cancelling() {
        let token = CancelToken::new();
        token.acknowledge();
        assert_eq!(token.state(), CancelState::Active);
    }

    #[test]
    fn test_on_cancel_after_cancel_runs_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        token.on_cancel(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = CancelToken::new();
        let clone = token.clone();
        let handle = tokio::spawn(async move {
            clone.cancelled().await;
            true
        });
        token.cancel();
        assert!(handle.await.unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
