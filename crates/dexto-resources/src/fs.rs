//! Filesystem loader, confined to a data source root.

use async_trait::async_trait;
use dexto_config::DataSourceConfig;
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::loader::{ResourceContent, ResourceLoader};

/// Loads `file://` URIs against `filesystem` data sources.
///
/// The URI path is interpreted relative to the source's root; anything
/// that lexically escapes the root is rejected before touching the disk.
#[derive(Debug, Default)]
pub struct FsLoader;

impl FsLoader {
    /// Create a filesystem loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve(uri: &Url, root: &str) -> ResourceResult<PathBuf> {
        let uri_path = uri.path();
        let mut resolved = PathBuf::from(root);
        for component in Path::new(uri_path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {},
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(ResourceError::AccessDenied {
                        uri: uri.to_string(),
                    });
                },
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ResourceLoader for FsLoader {
    fn supports(&self, uri: &Url, source: &DataSourceConfig) -> bool {
        uri.scheme() == "file" && matches!(source, DataSourceConfig::Filesystem { .. })
    }

    async fn load(&self, uri: &Url, source: &DataSourceConfig) -> ResourceResult<ResourceContent> {
        let DataSourceConfig::Filesystem { root } = source else {
            return Err(ResourceError::UnsupportedScheme {
                uri: uri.to_string(),
                source_type: source.type_name().to_owned(),
            });
        };
        let path = Self::resolve(uri, root)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(uri.to_string())
            } else {
                ResourceError::Io {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(match String::from_utf8(bytes) {
            Ok(text) => ResourceContent::Text(text),
            Err(e) => ResourceContent::Bytes(e.into_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(root: &Path) -> DataSourceConfig {
        DataSourceConfig::Filesystem {
            root: root.display().to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_text_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.md"), "hello").unwrap();

        let loader = FsLoader::new();
        let uri = Url::parse("file:///note.md").unwrap();
        let content = loader.load(&uri, &source(dir.path())).await.unwrap();
        assert_eq!(content, ResourceContent::Text("hello".to_owned()));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsLoader::new();
        let uri = Url::parse("file:///absent.md").unwrap();
        assert!(matches!(
            loader.load(&uri, &source(dir.path())).await,
            Err(ResourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_stays_confined_to_root() {
        // URL parsing normalizes ".." segments away; what remains is
        // resolved beneath the source root, never the real filesystem root.
        let dir = tempfile::tempdir().unwrap();
        let loader = FsLoader::new();
        let uri = Url::parse("file:///../../etc/passwd").unwrap();
        assert!(matches!(
            loader.load(&uri, &source(dir.path())).await,
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_supports_matrix() {
        let loader = FsLoader::new();
        let fs_source = DataSourceConfig::Filesystem {
            root: "/data".to_owned(),
        };
        let http_source = DataSourceConfig::Http {
            headers: Default::default(),
        };
        let file_uri = Url::parse("file:///a").unwrap();
        let https_uri = Url::parse("https://example.com/a").unwrap();

        assert!(loader.supports(&file_uri, &fs_source));
        assert!(!loader.supports(&https_uri, &fs_source));
        assert!(!loader.supports(&file_uri, &http_source));
    }
}
