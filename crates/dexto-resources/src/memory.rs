//! In-memory loader for tests and fixtures.

use async_trait::async_trait;
use dashmap::DashMap;
use dexto_config::DataSourceConfig;
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::loader::{ResourceContent, ResourceLoader};

/// Serves a fixed map of URI → content. Accepts any data source whose
/// type matches the URI scheme, so tests can stand in for any backend.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    entries: DashMap<String, ResourceContent>,
}

impl MemoryLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register content under a URI.
    pub fn insert(&self, uri: impl Into<String>, content: ResourceContent) {
        self.entries.insert(uri.into(), content);
    }

    /// Register text content under a URI.
    pub fn insert_text(&self, uri: impl Into<String>, text: impl Into<String>) {
        self.insert(uri, ResourceContent::Text(text.into()));
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    fn supports(&self, uri: &Url, source: &DataSourceConfig) -> bool {
        source.supports_scheme(uri.scheme())
    }

    async fn load(&self, uri: &Url, _source: &DataSourceConfig) -> ResourceResult<ResourceContent> {
        self.entries
            .get(uri.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))
    }
}
