//! Structural config diffing for `reload`.
//!
//! `reload` hot-applies what it can and restarts for the rest. The split:
//! LLM, storage, the MCP server set, and the approval mode are structural
//! (services were built from them); prompts, policies, limits, logging,
//! and plugin entries hot-apply.

use serde::Serialize;

use crate::types::AgentConfig;

/// One changed config group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigChange {
    /// `llm.*` changed.
    Llm,
    /// `storage.*` changed.
    Storage,
    /// The MCP server set or a server's spec changed.
    McpServers,
    /// `tool_confirmation.mode` changed.
    ApprovalMode,
    /// Other `tool_confirmation.*` fields changed.
    ToolPolicies,
    /// `sessions.*` changed.
    Sessions,
    /// System prompt or contributors changed.
    SystemPrompt,
    /// Plugin entries changed.
    Plugins,
    /// Logger level or transports changed.
    Logger,
    /// Starter prompts changed.
    Prompts,
    /// Data sources changed.
    DataSources,
    /// Internal tools or resources changed.
    InternalTools,
    /// Agent card / telemetry / other descriptive fields changed.
    Metadata,
}

impl ConfigChange {
    /// Whether applying this change requires a full restart.
    #[must_use]
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Self::Llm | Self::Storage | Self::McpServers | Self::ApprovalMode
        )
    }
}

/// The set of changes between two configs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigDiff {
    /// Changed groups, in declaration order.
    pub changes: Vec<ConfigChange>,
}

impl ConfigDiff {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether any change is structural.
    #[must_use]
    pub fn requires_restart(&self) -> bool {
        self.changes.iter().any(ConfigChange::requires_restart)
    }
}

fn json_eq<T: Serialize>(a: &T, b: &T) -> bool {
    // Compare through the serde model: config types are plain data and this
    // sidesteps hand-written PartialEq impls drifting from the fields.
    serde_json::to_value(a).ok() == serde_json::to_value(b).ok()
}

impl AgentConfig {
    /// Compute the structural diff between `self` (current) and `new`.
    #[must_use]
    pub fn diff(&self, new: &AgentConfig) -> ConfigDiff {
        let mut changes = Vec::new();

        if !json_eq(&self.llm, &new.llm) {
            changes.push(ConfigChange::Llm);
        }
        if self.storage != new.storage {
            changes.push(ConfigChange::Storage);
        }
        if self.mcp_servers != new.mcp_servers {
            changes.push(ConfigChange::McpServers);
        }
        if self.tool_confirmation.mode != new.tool_confirmation.mode {
            changes.push(ConfigChange::ApprovalMode);
        }
        if self.tool_confirmation.timeout_ms != new.tool_confirmation.timeout_ms
            || self.tool_confirmation.allowed_tools_storage
                != new.tool_confirmation.allowed_tools_storage
            || self.tool_confirmation.tool_policies != new.tool_confirmation.tool_policies
        {
            changes.push(ConfigChange::ToolPolicies);
        }
        if self.sessions != new.sessions {
            changes.push(ConfigChange::Sessions);
        }
        if !json_eq(&self.system_prompt, &new.system_prompt) {
            changes.push(ConfigChange::SystemPrompt);
        }
        if !json_eq(&self.plugins, &new.plugins) {
            changes.push(ConfigChange::Plugins);
        }
        if !json_eq(&self.logger, &new.logger) {
            changes.push(ConfigChange::Logger);
        }
        if !json_eq(&self.prompts, &new.prompts) {
            changes.push(ConfigChange::Prompts);
        }
        if self.data_sources != new.data_sources {
            changes.push(ConfigChange::DataSources);
        }
        if self.internal_tools != new.internal_tools
            || !json_eq(&self.internal_resources, &new.internal_resources)
        {
            changes.push(ConfigChange::InternalTools);
        }
        if !json_eq(&self.agent_card, &new.agent_card) || !json_eq(&self.telemetry, &new.telemetry)
        {
            changes.push(ConfigChange::Metadata);
        }

        ConfigDiff { changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolConfirmationMode;

    #[test]
    fn test_identical_configs_diff_empty() {
        let a = AgentConfig::default();
        let b = AgentConfig::default();
        let diff = a.diff(&b);
        assert!(diff.is_empty());
        assert!(!diff.requires_restart());
    }

    #[test]
    fn test_llm_change_requires_restart() {
        let a = AgentConfig::default();
        let mut b = AgentConfig::default();
        b.llm.provider = "openai".to_owned();
        let diff = a.diff(&b);
        assert_eq!(diff.changes, vec![ConfigChange::Llm]);
        assert!(diff.requires_restart());
    }

    #[test]
    fn test_mode_change_requires_restart() {
        let a = AgentConfig::default();
        let mut b = AgentConfig::default();
        b.tool_confirmation.mode = ToolConfirmationMode::AutoApprove;
        let diff = a.diff(&b);
        assert!(diff.changes.contains(&ConfigChange::ApprovalMode));
        assert!(diff.requires_restart());
    }

    #[test]
    fn test_timeout_change_hot_applies() {
        let a = AgentConfig::default();
        let mut b = AgentConfig::default();
        b.tool_confirmation.timeout_ms = 5_000;
        let diff = a.diff(&b);
        assert_eq!(diff.changes, vec![ConfigChange::ToolPolicies]);
        assert!(!diff.requires_restart());
    }

    #[test]
    fn test_prompt_change_hot_applies() {
        let a = AgentConfig::default();
        let mut b = AgentConfig::default();
        b.system_prompt = crate::types::SystemPromptConfig::Static("new".to_owned());
        let diff = a.diff(&b);
        assert_eq!(diff.changes, vec![ConfigChange::SystemPrompt]);
        assert!(!diff.requires_restart());
    }
}
