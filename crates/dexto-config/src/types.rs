//! Configuration types for the Dexto agent core.
//!
//! All types here are self-contained; domain types are mirrored and
//! converted at the boundary. Every section implements [`Default`] with
//! working values so a minimal config stays runnable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Top-level
// ---------------------------------------------------------------------------

/// Root configuration for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Stable, filesystem-safe agent identifier.
    pub agent_id: String,
    /// Descriptive metadata (name, description, links).
    pub agent_card: Option<AgentCard>,
    /// System prompt: a single string or composed contributors.
    pub system_prompt: SystemPromptConfig,
    /// LLM provider selection and limits.
    pub llm: LlmConfig,
    /// Logger level and transports.
    pub logger: LoggerConfig,
    /// Storage backends (database, cache, blob).
    pub storage: StorageConfig,
    /// Session limits.
    pub sessions: SessionsConfig,
    /// Tool approval policy.
    pub tool_confirmation: ToolConfirmationConfig,
    /// Named MCP server definitions.
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Plugin configuration.
    pub plugins: PluginsConfig,
    /// Which internal tools are enabled.
    pub internal_tools: Vec<InternalToolName>,
    /// Internal resource definitions.
    pub internal_resources: Vec<InternalResourceConfig>,
    /// Starter prompts.
    pub prompts: Vec<PromptConfig>,
    /// Named data sources for the resource loader.
    pub data_sources: HashMap<String, DataSourceConfig>,
    /// Telemetry export (OTEL-shaped), if enabled.
    pub telemetry: Option<TelemetryConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "dexto".to_owned(),
            agent_card: None,
            system_prompt: SystemPromptConfig::default(),
            llm: LlmConfig::default(),
            logger: LoggerConfig::default(),
            storage: StorageConfig::default(),
            sessions: SessionsConfig::default(),
            tool_confirmation: ToolConfirmationConfig::default(),
            mcp_servers: HashMap::new(),
            plugins: PluginsConfig::default(),
            internal_tools: vec![
                InternalToolName::AskUser,
                InternalToolName::EditFile,
                InternalToolName::CreateFiles,
            ],
            internal_resources: Vec::new(),
            prompts: Vec::new(),
            data_sources: HashMap::new(),
            telemetry: None,
        }
    }
}

/// Descriptive agent metadata surfaced to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCard {
    /// Display name.
    pub name: Option<String>,
    /// Short description.
    pub description: Option<String>,
    /// Homepage or documentation URL.
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

/// System prompt: either a plain string or ordered contributors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPromptConfig {
    /// A single static prompt.
    Static(String),
    /// Composed contributors, assembled by ascending priority.
    Contributors(Vec<SystemPromptContributor>),
}

impl Default for SystemPromptConfig {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

/// One system prompt contributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SystemPromptContributor {
    /// Fixed text.
    Static {
        /// The text.
        content: String,
        /// Ordering priority (ascending).
        #[serde(default)]
        priority: i32,
        /// Whether this contributor is active.
        #[serde(default = "default_true")]
        enabled: bool,
    },
    /// Resolved at composition time by a named dynamic source.
    Dynamic {
        /// Name of the registered dynamic contributor.
        name: String,
        /// Ordering priority (ascending).
        #[serde(default)]
        priority: i32,
        /// Whether this contributor is active.
        #[serde(default = "default_true")]
        enabled: bool,
    },
    /// Loaded through the resource loader.
    FileRef {
        /// Absolute URI (`file://`, `s3://`, ...).
        uri: String,
        /// Data source used to resolve the URI.
        data_source: String,
        /// Ordering priority (ascending).
        #[serde(default)]
        priority: i32,
        /// Whether this contributor is active.
        #[serde(default = "default_true")]
        enabled: bool,
    },
    /// Memory contributor resolved from stored context.
    Memory {
        /// Ordering priority (ascending).
        #[serde(default)]
        priority: i32,
        /// Whether this contributor is active.
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl SystemPromptContributor {
    /// This contributor's ordering priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        match self {
            Self::Static { priority, .. }
            | Self::Dynamic { priority, .. }
            | Self::FileRef { priority, .. }
            | Self::Memory { priority, .. } => *priority,
        }
    }

    /// Whether this contributor is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        match self {
            Self::Static { enabled, .. }
            | Self::Dynamic { enabled, .. }
            | Self::FileRef { enabled, .. }
            | Self::Memory { enabled, .. } => *enabled,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Which request path the provider client uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmRouter {
    /// The provider's native API.
    #[default]
    Native,
    /// An OpenAI-compatible endpoint (requires `base_url`).
    OpenaiCompat,
}

/// LLM provider selection and limits.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider identifier (e.g. `"anthropic"`, `"openai"`).
    pub provider: String,
    /// Model name sent to the provider API.
    pub model: String,
    /// API key. Redacted from `Debug`.
    pub api_key: String,
    /// Maximum model+tool iterations per run.
    pub max_iterations: u32,
    /// Request routing.
    pub router: LlmRouter,
    /// Base URL override (OpenAI-compatible endpoints).
    pub base_url: Option<String>,
    /// Input token window. When unset the provider default applies.
    pub max_input_tokens: Option<u32>,
    /// Output token cap per completion.
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Media types accepted in user content (e.g. `image/png`).
    pub allowed_media_types: Option<Vec<String>>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_owned(),
            model: "claude-sonnet-4-20250514".to_owned(),
            api_key: String::new(),
            max_iterations: 50,
            router: LlmRouter::Native,
            base_url: None,
            max_input_tokens: None,
            max_output_tokens: None,
            temperature: None,
            allowed_media_types: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("max_iterations", &self.max_iterations)
            .field("router", &self.router)
            .field("base_url", &self.base_url)
            .field("max_input_tokens", &self.max_input_tokens)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Logger level and transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level: `debug | info | warn | error`.
    pub level: String,
    /// Transports, each written independently.
    pub transports: Vec<LogTransportConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            transports: vec![LogTransportConfig::Tracing],
        }
    }
}

/// One log transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LogTransportConfig {
    /// Forward to the `tracing` subscriber stack.
    Tracing,
    /// Append JSON lines to a file. Rotation is the transport's concern.
    File {
        /// Destination path.
        path: String,
    },
    /// Retain entries in memory (tests, debugging).
    Buffer,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Storage backends for the three orthogonal stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable K/V + relational store.
    pub database: DatabaseConfig,
    /// TTL'd K/V cache.
    pub cache: CacheConfig,
    /// Content-addressed blob store.
    pub blob: BlobConfig,
}

/// Database backend variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DatabaseConfig {
    /// In-process, non-durable.
    #[default]
    InMemory,
    /// Embedded SQLite file.
    Sqlite {
        /// Database file path.
        path: String,
    },
    /// Remote Postgres.
    Postgres {
        /// Connection URL.
        url: String,
    },
}

/// Cache backend variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CacheConfig {
    /// In-process with lazy TTL expiry.
    #[default]
    InMemory,
    /// Remote Redis.
    Redis {
        /// Connection URL.
        url: String,
    },
}

/// Default per-blob size cap (16 MiB).
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 16 * 1024 * 1024;
/// Default total blob store cap (256 MiB).
pub const DEFAULT_MAX_TOTAL_BLOB_BYTES: u64 = 256 * 1024 * 1024;

/// Blob store backend variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlobConfig {
    /// In-process, SHA-256 deduplicated, quota-enforced.
    InMemory {
        /// Per-blob size cap in bytes.
        #[serde(default = "default_max_blob_bytes")]
        max_blob_bytes: u64,
        /// Total store cap in bytes.
        #[serde(default = "default_max_total_blob_bytes")]
        max_total_bytes: u64,
    },
    /// Local directory.
    Local {
        /// Root directory.
        path: String,
    },
    /// S3-compatible object store.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Region, when required by the endpoint.
        region: Option<String>,
    },
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self::InMemory {
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BLOB_BYTES,
        }
    }
}

fn default_max_blob_bytes() -> u64 {
    DEFAULT_MAX_BLOB_BYTES
}

fn default_max_total_blob_bytes() -> u64 {
    DEFAULT_MAX_TOTAL_BLOB_BYTES
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Maximum live sessions before LRU eviction of idle sessions.
    pub max_sessions: usize,
    /// Idle TTL in milliseconds before sweeper eviction.
    pub session_ttl_ms: u64,
    /// Maximum queued messages per session (floor 16).
    pub max_queued: usize,
    /// Grace window in milliseconds for cancellation to reach idle.
    pub cancel_grace_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_ttl_ms: 60 * 60 * 1000,
            max_queued: 32,
            cancel_grace_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool confirmation
// ---------------------------------------------------------------------------

/// Approval mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolConfirmationMode {
    /// Ask the registered handler for every undecided call.
    #[default]
    Manual,
    /// Approve everything policy does not deny.
    AutoApprove,
    /// Deny everything policy does not allow.
    AutoDeny,
}

/// Where session allow-caches are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedToolsStorage {
    /// In-memory only; lost on restart.
    #[default]
    Memory,
    /// Written through the database; survives agent restart.
    Persistent,
}

/// Static per-agent tool policy lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicies {
    /// Tools approved without consulting anything else.
    pub always_allow: Vec<String>,
    /// Tools denied before anything else is consulted.
    pub always_deny: Vec<String>,
}

/// Tool approval configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfirmationConfig {
    /// Approval mode.
    pub mode: ToolConfirmationMode,
    /// Handler decision deadline in milliseconds.
    pub timeout_ms: u64,
    /// Where remembered choices are kept.
    pub allowed_tools_storage: AllowedToolsStorage,
    /// Static allow/deny lists.
    pub tool_policies: ToolPolicies,
}

impl Default for ToolConfirmationConfig {
    fn default() -> Self {
        Self {
            mode: ToolConfirmationMode::Manual,
            timeout_ms: 120_000,
            allowed_tools_storage: AllowedToolsStorage::Memory,
            tool_policies: ToolPolicies::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// MCP servers
// ---------------------------------------------------------------------------

/// Failure handling for one MCP connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// Connection errors abort subsequent calls.
    Strict,
    /// Connection errors schedule backoff reconnects.
    #[default]
    Lenient,
}

/// Transport configuration for a single MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum McpServerConfig {
    /// Spawn a child process and speak MCP over stdio.
    Stdio {
        /// Command to run.
        command: String,
        /// Arguments for the command.
        #[serde(default)]
        args: Vec<String>,
        /// Environment variables.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Per-call timeout in milliseconds.
        #[serde(default = "default_mcp_timeout_ms")]
        timeout_ms: u64,
        /// Failure handling.
        #[serde(default)]
        connection_mode: ConnectionMode,
    },
    /// Server-Sent Events endpoint.
    Sse {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Per-call timeout in milliseconds.
        #[serde(default = "default_mcp_timeout_ms")]
        timeout_ms: u64,
        /// Failure handling.
        #[serde(default)]
        connection_mode: ConnectionMode,
    },
    /// Streamable-HTTP endpoint.
    Http {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Per-call timeout in milliseconds.
        #[serde(default = "default_mcp_timeout_ms")]
        timeout_ms: u64,
        /// Failure handling.
        #[serde(default)]
        connection_mode: ConnectionMode,
    },
}

impl McpServerConfig {
    /// This server's failure-handling mode.
    #[must_use]
    pub fn connection_mode(&self) -> ConnectionMode {
        match self {
            Self::Stdio {
                connection_mode, ..
            }
            | Self::Sse {
                connection_mode, ..
            }
            | Self::Http {
                connection_mode, ..
            } => *connection_mode,
        }
    }

    /// This server's per-call timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Self::Stdio { timeout_ms, .. }
            | Self::Sse { timeout_ms, .. }
            | Self::Http { timeout_ms, .. } => *timeout_ms,
        }
    }
}

fn default_mcp_timeout_ms() -> u64 {
    30_000
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Enable the built-in content policy plugin.
    pub content_policy: Option<serde_json::Value>,
    /// Enable the built-in response sanitizer plugin.
    pub response_sanitizer: Option<serde_json::Value>,
    /// Custom plugin entries. Module resolution is an enrichment concern;
    /// instances registered at runtime bypass these entries.
    pub custom: Vec<PluginEntryConfig>,
}

/// One configured plugin entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntryConfig {
    /// Unique plugin name.
    pub name: String,
    /// Module reference resolved by the enrichment layer, when the plugin
    /// is not registered as an instance.
    pub module_ref: Option<String>,
    /// Whether the plugin is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether plugin failures abort the run.
    #[serde(default)]
    pub blocking: bool,
    /// Ordering priority (ascending; ties break by registration order).
    #[serde(default)]
    pub priority: i32,
    /// Plugin-specific configuration passed to `initialize`.
    pub config: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Internal tools & resources
// ---------------------------------------------------------------------------

/// Names of the built-in internal tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalToolName {
    /// Escalate a question to the approval handler.
    AskUser,
    /// Apply a patch to an existing file.
    EditFile,
    /// Create one or more files.
    CreateFiles,
}

/// One internal resource definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalResourceConfig {
    /// Resource URI.
    pub uri: String,
    /// Data source used to resolve the URI.
    pub data_source: String,
    /// Display name.
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// A starter prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PromptConfig {
    /// Inline prompt text.
    Inline {
        /// Prompt name.
        name: String,
        /// Prompt text.
        content: String,
        /// Whether to surface in the starter list.
        #[serde(default)]
        show_in_starters: bool,
    },
    /// Prompt loaded through the resource loader.
    File {
        /// Prompt name.
        name: String,
        /// Absolute URI.
        uri: String,
        /// Data source used to resolve the URI.
        data_source: String,
        /// Whether to surface in the starter list.
        #[serde(default)]
        show_in_starters: bool,
    },
}

// ---------------------------------------------------------------------------
// Data sources
// ---------------------------------------------------------------------------

/// A named data source for the resource loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataSourceConfig {
    /// Local filesystem rooted at a directory.
    Filesystem {
        /// Root directory; loads are confined beneath it.
        root: String,
    },
    /// S3-compatible object store.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Region, when required.
        region: Option<String>,
    },
    /// HTTP(S) endpoint.
    Http {
        /// Extra request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl DataSourceConfig {
    /// The type tag used in diagnostics and scheme cross-checks.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Filesystem { .. } => "filesystem",
            Self::S3 { .. } => "s3",
            Self::Http { .. } => "http",
        }
    }

    /// Whether this data source can serve the given URI scheme.
    #[must_use]
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        match self {
            Self::Filesystem { .. } => scheme == "file",
            Self::S3 { .. } => scheme == "s3",
            Self::Http { .. } => scheme == "http" || scheme == "https",
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// OTEL-shaped telemetry export configuration.
///
/// The core only carries this through to the exporter wiring, which is an
/// external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Whether export is enabled.
    pub enabled: bool,
    /// OTLP endpoint.
    pub endpoint: Option<String>,
    /// Service name reported to the collector.
    pub service_name: Option<String>,
    /// Extra exporter headers.
    pub headers: HashMap<String, String>,
}
