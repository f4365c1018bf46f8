//! Log transports.

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::entry::{LogEntry, LogLevel};

/// Error returned by a transport that failed to write an entry.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure (disk, socket).
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The entry could not be serialized for this transport.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A sink for log entries.
///
/// Transports must be cheap per entry; rotation, batching, and buffering
/// are the transport's own concern.
pub trait LogTransport: Send + Sync {
    /// Write one entry.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on failure; the logger isolates the
    /// failure and still delivers the entry to the other transports.
    fn write(&self, entry: &LogEntry) -> Result<(), TransportError>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Transport that forwards entries to the `tracing` subscriber stack.
#[derive(Debug, Default)]
pub struct TracingTransport;

impl LogTransport for TracingTransport {
    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let context = serde_json::to_string(&entry.context).unwrap_or_default();
        match entry.level {
            LogLevel::Debug => tracing::debug!(
                component = %entry.component,
                agent_id = %entry.agent_id,
                context = %context,
                "{}",
                entry.message
            ),
            LogLevel::Info => tracing::info!(
                component = %entry.component,
                agent_id = %entry.agent_id,
                context = %context,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                component = %entry.component,
                agent_id = %entry.agent_id,
                context = %context,
                "{}",
                entry.message
            ),
            LogLevel::Error => tracing::error!(
                component = %entry.component,
                agent_id = %entry.agent_id,
                context = %context,
                "{}",
                entry.message
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory transport that retains entries for assertions.
#[derive(Debug, Default)]
pub struct BufferTransport {
    entries: Mutex<Vec<LogEntry>>,
}

impl BufferTransport {
    /// Create an empty buffer transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries written so far.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop all retained entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogTransport for BufferTransport {
    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "buffer"
    }
}
