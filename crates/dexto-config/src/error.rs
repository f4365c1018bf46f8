//! Configuration error types.

use thiserror::Error;

/// Validation or cross-field invariant violation.
///
/// Config errors are reported to the caller of construction or `reload`;
/// they are never surfaced from `run`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The agent id failed validation.
    #[error("invalid agent id: {0}")]
    InvalidAgentId(#[from] dexto_core::AgentIdError),

    /// A numeric field was out of range.
    #[error("{field}: {reason}")]
    OutOfRange {
        /// The offending field path.
        field: String,
        /// What was wrong.
        reason: String,
    },

    /// A URI referenced a data source that is not configured.
    #[error("URI {uri} references unknown data source {data_source}")]
    UnknownDataSource {
        /// The URI in question.
        uri: String,
        /// The missing data-source name.
        data_source: String,
    },

    /// A URI's scheme does not match its data source's type.
    #[error("URI {uri} has scheme {scheme} but data source {data_source} is {source_type}")]
    SchemeMismatch {
        /// The URI in question.
        uri: String,
        /// The URI's scheme.
        scheme: String,
        /// The data-source name.
        data_source: String,
        /// The configured data-source type.
        source_type: String,
    },

    /// A URI could not be parsed at all.
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri {
        /// The unparseable URI.
        uri: String,
        /// Parser message.
        reason: String,
    },

    /// The LLM router is incompatible with the provider or base URL.
    #[error("llm router incompatible: {0}")]
    IncompatibleRouter(String),

    /// Two plugin entries share a name.
    #[error("duplicate plugin name: {0}")]
    DuplicatePluginName(String),

    /// Blob quotas are inconsistent.
    #[error("blob store quota invalid: {0}")]
    InvalidBlobQuota(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
