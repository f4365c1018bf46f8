//! HTTP(S) loader.

use async_trait::async_trait;
use dexto_config::DataSourceConfig;
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::loader::{ResourceContent, ResourceLoader};

/// Loads `http://` and `https://` URIs against `http` data sources.
#[derive(Debug)]
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    /// Create an HTTP loader with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create an HTTP loader with a caller-provided client (timeouts,
    /// proxies, TLS settings).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceLoader for HttpLoader {
    fn supports(&self, uri: &Url, source: &DataSourceConfig) -> bool {
        matches!(uri.scheme(), "http" | "https")
            && matches!(source, DataSourceConfig::Http { .. })
    }

    async fn load(&self, uri: &Url, source: &DataSourceConfig) -> ResourceResult<ResourceContent> {
        let DataSourceConfig::Http { headers } = source else {
            return Err(ResourceError::UnsupportedScheme {
                uri: uri.to_string(),
                source_type: source.type_name().to_owned(),
            });
        };

        let mut request = self.client.get(uri.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| ResourceError::Io {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResourceError::NotFound(uri.to_string()));
        }
        if !status.is_success() {
            return Err(ResourceError::HttpStatus {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let is_text = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                ct.starts_with("text/")
                    || ct.starts_with("application/json")
                    || ct.starts_with("application/yaml")
                    || ct.starts_with("application/xml")
            });

        let bytes = response.bytes().await.map_err(|e| ResourceError::Io {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        if is_text {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(ResourceContent::Text(text)),
                Err(e) => Ok(ResourceContent::Bytes(e.into_bytes())),
            }
        } else {
            Ok(ResourceContent::Bytes(bytes.to_vec()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_supports_matrix() {
        let loader = HttpLoader::new();
        let http_source = DataSourceConfig::Http {
            headers: HashMap::new(),
        };
        let fs_source = DataSourceConfig::Filesystem {
            root: "/data".to_owned(),
        };

        let https = Url::parse("https://example.com/doc.md").unwrap();
        let http = Url::parse("http://example.com/doc.md").unwrap();
        let s3 = Url::parse("s3://bucket/doc.md").unwrap();

        assert!(loader.supports(&https, &http_source));
        assert!(loader.supports(&http, &http_source));
        assert!(!loader.supports(&s3, &http_source));
        assert!(!loader.supports(&https, &fs_source));
    }
}
