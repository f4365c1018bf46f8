//! System prompt composition.
//!
//! The system prompt is reassembled at every iteration so file-backed and
//! dynamic contributors pick up changes mid-session. Contributors are
//! ordered by ascending priority; disabled contributors are skipped; a
//! contributor that fails to resolve is logged and dropped from that
//! composition rather than failing the run.

use dexto_config::{DataSourceConfig, SystemPromptConfig, SystemPromptContributor};
use dexto_logger::Logger;
use dexto_resources::CompositeLoader;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// A named dynamic prompt contributor registered by the host.
pub type DynamicContributor = Arc<dyn Fn() -> String + Send + Sync>;

/// Assembles the system prompt from configured contributors.
pub struct SystemPromptComposer {
    config: SystemPromptConfig,
    data_sources: HashMap<String, DataSourceConfig>,
    loader: Arc<CompositeLoader>,
    dynamic: HashMap<String, DynamicContributor>,
    logger: Logger,
}

impl SystemPromptComposer {
    /// Create a composer.
    #[must_use]
    pub fn new(
        config: SystemPromptConfig,
        data_sources: HashMap<String, DataSourceConfig>,
        loader: Arc<CompositeLoader>,
        logger: Logger,
    ) -> Self {
        Self {
            config,
            data_sources,
            loader,
            dynamic: HashMap::new(),
            logger: logger.child("prompt", []),
        }
    }

    /// Register a dynamic contributor under a name referenced by config.
    pub fn register_dynamic(&mut self, name: impl Into<String>, contributor: DynamicContributor) {
        self.dynamic.insert(name.into(), contributor);
    }

    /// Replace the prompt configuration (hot-apply on reload).
    pub fn set_config(&mut self, config: SystemPromptConfig) {
        self.config = config;
    }

    /// Compose the current prompt text.
    pub async fn compose(&self) -> String {
        match &self.config {
            SystemPromptConfig::Static(text) => text.clone(),
            SystemPromptConfig::Contributors(contributors) => {
                let mut active: Vec<&SystemPromptContributor> =
                    contributors.iter().filter(|c| c.enabled()).collect();
                active.sort_by_key(|c| c.priority());

                let mut parts = Vec::with_capacity(active.len());
                for contributor in active {
                    if let Some(part) = self.resolve(contributor).await {
                        if !part.trim().is_empty() {
                            parts.push(part);
                        }
                    }
                }
                parts.join("\n\n")
            },
        }
    }

    async fn resolve(&self, contributor: &SystemPromptContributor) -> Option<String> {
        match contributor {
            SystemPromptContributor::Static { content, .. } => Some(content.clone()),
            SystemPromptContributor::Dynamic { name, .. } => match self.dynamic.get(name) {
                Some(f) => Some(f()),
                None => {
                    self.logger.warn(
                        "Dynamic prompt contributor not registered",
                        Some(json!({"name": name})),
                    );
                    None
                },
            },
            SystemPromptContributor::FileRef {
                uri, data_source, ..
            } => {
                let Some(source) = self.data_sources.get(data_source) else {
                    self.logger.warn(
                        "Prompt file-ref names unknown data source",
                        Some(json!({"uri": uri, "data_source": data_source})),
                    );
                    return None;
                };
                match self.loader.load(uri, source).await {
                    Ok(content) => Some(content.into_text()),
                    Err(e) => {
                        self.logger.warn(
                            "Prompt file-ref failed to load",
                            Some(json!({"uri": uri, "error": e.to_string()})),
                        );
                        None
                    },
                }
            },
            SystemPromptContributor::Memory { .. } => {
                // Memory contributors resolve through a registered dynamic
                // source named "memory"; absent that, contribute nothing.
                self.dynamic.get("memory").map(|f| f())
            },
        }
    }
}

impl std::fmt::Debug for SystemPromptComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPromptComposer")
            .field("dynamic", &self.dynamic.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
