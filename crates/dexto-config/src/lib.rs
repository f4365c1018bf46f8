//! Dexto Config - Validated configuration consumed by the agent core.
//!
//! The core receives an *already-enriched* configuration: discovery,
//! template expansion, YAML parsing, and secret resolution all happen in
//! the enrichment layer before these types are constructed. This crate
//! provides:
//!
//! - Self-contained config types for every top-level group
//! - Cross-field validation ([`AgentConfig::validate`])
//! - Structural diffing ([`AgentConfig::diff`]) used by `reload` to decide
//!   between restarting and hot-applying

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod diff;
mod error;
mod types;
mod validate;

pub use diff::{ConfigChange, ConfigDiff};
pub use error::{ConfigError, ConfigResult};
pub use types::{
    AgentCard, AgentConfig, AllowedToolsStorage, BlobConfig, CacheConfig, ConnectionMode,
    DataSourceConfig, DatabaseConfig, InternalResourceConfig, InternalToolName, LlmConfig,
    LlmRouter, LogTransportConfig, LoggerConfig, McpServerConfig, PluginEntryConfig,
    PluginsConfig, PromptConfig, SessionsConfig, StorageConfig, SystemPromptConfig,
    SystemPromptContributor, TelemetryConfig, ToolConfirmationMode, ToolConfirmationConfig,
    ToolPolicies,
};
