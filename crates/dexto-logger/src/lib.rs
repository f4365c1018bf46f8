//! Dexto Logger - Structured, per-agent, multi-transport logging.
//!
//! The [`Logger`] is constructed once per agent at enrichment time and
//! injected into every service; there is no process-global logger. Each
//! entry carries the level, message, timestamp, component, agent id, and a
//! structured context map. Multiple transports each write every entry; a
//! failing transport is isolated and never prevents the others from
//! writing.
//!
//! The default transport forwards entries to `tracing`, so the runtime's
//! diagnostics and the host application's subscriber stack stay unified.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod entry;
mod transport;

pub use entry::{LogEntry, LogLevel};
pub use transport::{BufferTransport, LogTransport, TracingTransport, TransportError};

use dexto_core::AgentId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

struct LoggerShared {
    agent_id: AgentId,
    min_level: LogLevel,
    transports: Vec<Arc<dyn LogTransport>>,
}

/// Structured logger scoped to one agent and one component.
///
/// Cloning is cheap; [`Logger::child`] derives a logger for a sub-component
/// that inherits the agent scope, transports, and base context.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<LoggerShared>,
    component: String,
    base_context: BTreeMap<String, Value>,
}

impl Logger {
    /// Create a logger for an agent with the given transports.
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        min_level: LogLevel,
        transports: Vec<Arc<dyn LogTransport>>,
    ) -> Self {
        Self {
            shared: Arc::new(LoggerShared {
                agent_id,
                min_level,
                transports,
            }),
            component: "agent".to_string(),
            base_context: BTreeMap::new(),
        }
    }

    /// Create a logger that forwards everything to `tracing`.
    #[must_use]
    pub fn tracing_only(agent_id: AgentId, min_level: LogLevel) -> Self {
        Self::new(agent_id, min_level, vec![Arc::new(TracingTransport)])
    }

    /// Derive a child logger for a sub-component.
    ///
    /// Extra context entries are merged into (and shadow) the parent's base
    /// context.
    #[must_use]
    pub fn child(
        &self,
        component: impl Into<String>,
        extra_context: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut base_context = self.base_context.clone();
        base_context.extend(extra_context);
        Self {
            shared: Arc::clone(&self.shared),
            component: component.into(),
            base_context,
        }
    }

    /// The agent this logger belongs to.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.shared.agent_id
    }

    /// The component this logger is scoped to.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Log at debug level.
    pub fn debug(&self, message: impl Into<String>, context: Option<Value>) {
        self.log(LogLevel::Debug, message, context);
    }

    /// Log at info level.
    pub fn info(&self, message: impl Into<String>, context: Option<Value>) {
        self.log(LogLevel::Info, message, context);
    }

    /// Log at warn level.
    pub fn warn(&self, message: impl Into<String>, context: Option<Value>) {
        self.log(LogLevel::Warn, message, context);
    }

    /// Log at error level.
    pub fn error(&self, message: impl Into<String>, context: Option<Value>) {
        self.log(LogLevel::Error, message, context);
    }

    /// Record an exception with its chain of sources.
    pub fn track_exception(&self, err: &(dyn std::error::Error + 'static), context: Option<Value>) {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        let mut ctx = match context {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other);
                map
            },
            None => serde_json::Map::new(),
        };
        ctx.insert("exception".to_string(), Value::Bool(true));
        if !chain.is_empty() {
            ctx.insert(
                "cause_chain".to_string(),
                Value::Array(chain.into_iter().map(Value::String).collect()),
            );
        }
        self.log(LogLevel::Error, err.to_string(), Some(Value::Object(ctx)));
    }

    fn log(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        if level < self.shared.min_level {
            return;
        }
        let mut merged = self.base_context.clone();
        if let Some(Value::Object(map)) = context {
            merged.extend(map);
        } else if let Some(other) = context {
            merged.insert("context".to_string(), other);
        }

        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
            component: self.component.clone(),
            agent_id: self.shared.agent_id.clone(),
            context: merged,
        };

        for transport in &self.shared.transports {
            if let Err(e) = transport.write(&entry) {
                // A broken transport must not take the others down.
                tracing::warn!(
                    transport = transport.name(),
                    error = %e,
                    "Log transport failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("agent_id", &self.shared.agent_id)
            .field("component", &self.component)
            .field("transport_count", &self.shared.transports.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_id() -> AgentId {
        AgentId::new("test-agent").unwrap()
    }

    #[test]
    fn test_entries_carry_scope() {
        let buffer = Arc::new(BufferTransport::new());
        let logger = Logger::new(agent_id(), LogLevel::Debug, vec![Arc::clone(&buffer) as _]);

        logger.info("hello", Some(json!({"k": 1})));

        let entries = buffer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[0].message, "hello");
        assert_eq!(entries[0].component, "agent");
        assert_eq!(entries[0].agent_id.as_str(), "test-agent");
        assert_eq!(entries[0].context.get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_child_inherits_and_shadows() {
        let buffer = Arc::new(BufferTransport::new());
        let logger = Logger::new(agent_id(), LogLevel::Debug, vec![Arc::clone(&buffer) as _]);
        let child = logger.child("mcp", [("server".to_string(), json!("fs"))]);

        child.debug("connecting", Some(json!({"attempt": 2})));

        let entries = buffer.entries();
        assert_eq!(entries[0].component, "mcp");
        assert_eq!(entries[0].context.get("server"), Some(&json!("fs")));
        assert_eq!(entries[0].context.get("attempt"), Some(&json!(2)));
    }

    #[test]
    fn test_min_level_filters() {
        let buffer = Arc::new(BufferTransport::new());
        let logger = Logger::new(agent_id(), LogLevel::Warn, vec![Arc::clone(&buffer) as _]);

        logger.debug("nope", None);
        logger.info("nope", None);
        logger.warn("yes", None);

        assert_eq!(buffer.entries().len(), 1);
    }

    #[test]
    fn test_failing_transport_is_isolated() {
        struct Broken;
        impl LogTransport for Broken {
            fn write(&self, _entry: &LogEntry) -> Result<(), TransportError> {
                Err(TransportError::Io("disk full".to_string()))
            }
            fn name(&self) -> &'static str {
                "broken"
            }
        }

        let buffer = Arc::new(BufferTransport::new());
        let logger = Logger::new(
            agent_id(),
            LogLevel::Debug,
            vec![Arc::new(Broken), Arc::clone(&buffer) as _],
        );

        logger.info("still delivered", None);
        assert_eq!(buffer.entries().len(), 1);
    }

    #[test]
    fn test_track_exception_includes_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer failed")]
        struct Outer {
            #[source]
            inner: std::io::Error,
        }

        let buffer = Arc::new(BufferTransport::new());
        let logger = Logger::new(agent_id(), LogLevel::Debug, vec![Arc::clone(&buffer) as _]);

        let err = Outer {
            inner: std::io::Error::other("inner broke"),
        };
        logger.track_exception(&err, None);

        let entries = buffer.entries();
        assert_eq!(entries[0].message, "outer failed");
        assert_eq!(entries[0].context.get("exception"), Some(&json!(true)));
        assert_eq!(
            entries[0].context.get("cause_chain"),
            Some(&json!(["inner broke"]))
        );
    }
}
