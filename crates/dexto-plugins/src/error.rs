//! Plugin error types.

use thiserror::Error;

/// Errors surfaced by the plugin layer.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A blocking plugin failed; the current run aborts.
    #[error("blocking plugin {name} failed in {hook}: {message}")]
    Blocking {
        /// The plugin that failed.
        name: String,
        /// The hook being run.
        hook: &'static str,
        /// Failure message.
        message: String,
    },

    /// Two plugins were registered under one name.
    #[error("duplicate plugin name: {0}")]
    DuplicateName(String),

    /// A blocking plugin mutated an assistant turn in a way that breaks
    /// the tool-call/result pairing invariant.
    #[error("plugin {name} altered tool call identity in before_response")]
    ToolCallIdentityViolation {
        /// The offending plugin.
        name: String,
    },
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
