//! Cross-field configuration validation.
//!
//! Runs at the schema layer, before anything reaches the core. The one
//! invariant that cannot be checked here (manual approval mode requires a
//! registered handler) is enforced by the agent at `start()`.

use dexto_core::AgentId;
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{
    AgentConfig, BlobConfig, LlmRouter, PromptConfig, SystemPromptConfig, SystemPromptContributor,
};

impl AgentConfig {
    /// Validate the whole configuration.
    ///
    /// Returns the parsed [`AgentId`] on success so callers do not
    /// re-validate the id string.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: invalid agent id, numeric
    /// fields out of range, unknown or mismatched data sources, router
    /// incompatibility, duplicate plugin names, or inconsistent blob
    /// quotas.
    pub fn validate(&self) -> ConfigResult<AgentId> {
        let agent_id = AgentId::new(self.agent_id.clone())?;

        if self.llm.max_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "llm.max_iterations".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sessions.max_sessions".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.sessions.max_queued < 16 {
            return Err(ConfigError::OutOfRange {
                field: "sessions.max_queued".to_owned(),
                reason: "must be at least 16".to_owned(),
            });
        }
        if self.tool_confirmation.timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "tool_confirmation.timeout_ms".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }

        self.validate_router()?;
        self.validate_blob_quota()?;
        self.validate_data_source_refs()?;
        self.validate_plugin_names()?;

        Ok(agent_id)
    }

    fn validate_router(&self) -> ConfigResult<()> {
        match (self.llm.router, self.llm.base_url.as_deref()) {
            (LlmRouter::OpenaiCompat, None) => Err(ConfigError::IncompatibleRouter(
                "openai-compat router requires base_url".to_owned(),
            )),
            (LlmRouter::Native, Some(_)) => Err(ConfigError::IncompatibleRouter(format!(
                "provider {} with native router does not accept base_url",
                self.llm.provider
            ))),
            _ => Ok(()),
        }
    }

    fn validate_blob_quota(&self) -> ConfigResult<()> {
        if let BlobConfig::InMemory {
            max_blob_bytes,
            max_total_bytes,
        } = &self.storage.blob
        {
            if *max_blob_bytes == 0 || *max_total_bytes == 0 {
                return Err(ConfigError::InvalidBlobQuota(
                    "quotas must be positive".to_owned(),
                ));
            }
            if max_blob_bytes > max_total_bytes {
                return Err(ConfigError::InvalidBlobQuota(format!(
                    "per-blob cap {max_blob_bytes} exceeds total cap {max_total_bytes}"
                )));
            }
        }
        Ok(())
    }

    fn validate_data_source_refs(&self) -> ConfigResult<()> {
        let mut refs: Vec<(&str, &str)> = Vec::new();

        if let SystemPromptConfig::Contributors(contributors) = &self.system_prompt {
            for contributor in contributors {
                if let SystemPromptContributor::FileRef {
                    uri, data_source, ..
                } = contributor
                {
                    refs.push((uri, data_source));
                }
            }
        }
        for prompt in &self.prompts {
            if let PromptConfig::File {
                uri, data_source, ..
            } = prompt
            {
                refs.push((uri, data_source));
            }
        }
        for resource in &self.internal_resources {
            refs.push((&resource.uri, &resource.data_source));
        }

        for (uri, data_source) in refs {
            let parsed = Url::parse(uri).map_err(|e| ConfigError::InvalidUri {
                uri: uri.to_owned(),
                reason: e.to_string(),
            })?;
            let Some(source) = self.data_sources.get(data_source) else {
                return Err(ConfigError::UnknownDataSource {
                    uri: uri.to_owned(),
                    data_source: data_source.to_owned(),
                });
            };
            if !source.supports_scheme(parsed.scheme()) {
                return Err(ConfigError::SchemeMismatch {
                    uri: uri.to_owned(),
                    scheme: parsed.scheme().to_owned(),
                    data_source: data_source.to_owned(),
                    source_type: source.type_name().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn validate_plugin_names(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.plugins.custom {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicatePluginName(entry.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataSourceConfig, InternalResourceConfig, PluginEntryConfig};

    #[test]
    fn test_default_config_validates() {
        let config = AgentConfig::default();
        let id = config.validate().unwrap();
        assert_eq!(id.as_str(), "dexto");
    }

    #[test]
    fn test_bad_agent_id_rejected() {
        let config = AgentConfig {
            agent_id: "bad/id".to_owned(),
            ..AgentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAgentId(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut config = AgentConfig::default();
        config.llm.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field, .. }) if field == "llm.max_iterations"
        ));
    }

    #[test]
    fn test_queue_floor_enforced() {
        let mut config = AgentConfig::default();
        config.sessions.max_queued = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_router_base_url_cross_check() {
        let mut config = AgentConfig::default();
        config.llm.router = LlmRouter::OpenaiCompat;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleRouter(_))
        ));

        config.llm.base_url = Some("https://llm.example.com/v1".to_owned());
        assert!(config.validate().is_ok());

        config.llm.router = LlmRouter::Native;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_data_source_rejected() {
        let mut config = AgentConfig::default();
        config.internal_resources.push(InternalResourceConfig {
            uri: "file:///docs/readme.md".to_owned(),
            data_source: "docs".to_owned(),
            name: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownDataSource { .. })
        ));
    }

    #[test]
    fn test_scheme_mismatch_rejected() {
        let mut config = AgentConfig::default();
        config.data_sources.insert(
            "docs".to_owned(),
            DataSourceConfig::S3 {
                bucket: "docs".to_owned(),
                region: None,
            },
        );
        config.internal_resources.push(InternalResourceConfig {
            uri: "file:///docs/readme.md".to_owned(),
            data_source: "docs".to_owned(),
            name: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_matching_data_source_accepted() {
        let mut config = AgentConfig::default();
        config.data_sources.insert(
            "docs".to_owned(),
            DataSourceConfig::Filesystem {
                root: "/docs".to_owned(),
            },
        );
        config.internal_resources.push(InternalResourceConfig {
            uri: "file:///docs/readme.md".to_owned(),
            data_source: "docs".to_owned(),
            name: None,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_plugin_names_rejected() {
        let mut config = AgentConfig::default();
        for _ in 0..2 {
            config.plugins.custom.push(PluginEntryConfig {
                name: "sanitizer".to_owned(),
                module_ref: None,
                enabled: true,
                blocking: false,
                priority: 0,
                config: None,
            });
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePluginName(name)) if name == "sanitizer"
        ));
    }

    #[test]
    fn test_blob_quota_cross_check() {
        let mut config = AgentConfig::default();
        config.storage.blob = BlobConfig::InMemory {
            max_blob_bytes: 100,
            max_total_bytes: 10,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBlobQuota(_))
        ));
    }
}
