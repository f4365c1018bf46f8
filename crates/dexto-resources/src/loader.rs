//! The resource loader contract.

use async_trait::async_trait;
use dexto_config::DataSourceConfig;
use std::sync::Arc;
use url::Url;

use crate::error::{ResourceError, ResourceResult};

/// Loaded resource content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceContent {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl ResourceContent {
    /// View as text, converting bytes lossily when needed.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        }
    }

    /// View as bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Bytes(b) => b,
        }
    }

    /// Content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Bytes(b) => b.len(),
        }
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads resources by absolute URI against a named data source.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Whether this loader can serve `uri` against `source`.
    fn supports(&self, uri: &Url, source: &DataSourceConfig) -> bool;

    /// Load the resource.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] describing the failure; see the error
    /// taxonomy for the variants loaders may produce.
    async fn load(&self, uri: &Url, source: &DataSourceConfig) -> ResourceResult<ResourceContent>;
}

/// Parse and validate an absolute resource URI.
///
/// # Errors
///
/// Returns [`ResourceError::InvalidUri`] when the string is not an
/// absolute URI with a scheme.
pub(crate) fn parse_uri(uri: &str) -> ResourceResult<Url> {
    Url::parse(uri).map_err(|e| ResourceError::InvalidUri {
        uri: uri.to_owned(),
        reason: e.to_string(),
    })
}

/// Dispatches to the first registered loader that supports the request.
pub struct CompositeLoader {
    loaders: Vec<Arc<dyn ResourceLoader>>,
}

impl CompositeLoader {
    /// Create a composite over the given loaders, tried in order.
    #[must_use]
    pub fn new(loaders: Vec<Arc<dyn ResourceLoader>>) -> Self {
        Self { loaders }
    }

    /// Load `uri` against `source` using the first supporting loader.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnsupportedScheme`] when no loader
    /// supports the request, or the supporting loader's error.
    pub async fn load(
        &self,
        uri: &str,
        source: &DataSourceConfig,
    ) -> ResourceResult<ResourceContent> {
        let parsed = parse_uri(uri)?;
        for loader in &self.loaders {
            if loader.supports(&parsed, source) {
                return loader.load(&parsed, source).await;
            }
        }
        Err(ResourceError::UnsupportedScheme {
            uri: uri.to_owned(),
            source_type: source.type_name().to_owned(),
        })
    }

    /// Whether any registered loader supports the request.
    #[must_use]
    pub fn supports(&self, uri: &str, source: &DataSourceConfig) -> bool {
        parse_uri(uri)
            .map(|parsed| self.loaders.iter().any(|l| l.supports(&parsed, source)))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for CompositeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLoader")
            .field("loader_count", &self.loaders.len())
            .finish()
    }
}
