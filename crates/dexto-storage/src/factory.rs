//! Storage factory.
//!
//! Resolves an already-enriched [`StorageConfig`] into live stores. The
//! in-memory variants are built here; every other variant must be
//! installed by the enrichment layer as a builder callback, because the
//! core never resolves paths or opens connections itself.

use dexto_config::{BlobConfig, CacheConfig, DatabaseConfig, StorageConfig};
use dexto_logger::Logger;
use serde_json::json;
use std::sync::Arc;

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::cache::{Cache, MemoryCache};
use crate::database::{Database, MemoryDatabase};
use crate::error::{StorageError, StorageResult};

type DatabaseBuilder =
    Box<dyn Fn(&DatabaseConfig) -> StorageResult<Arc<dyn Database>> + Send + Sync>;
type CacheBuilder = Box<dyn Fn(&CacheConfig) -> StorageResult<Arc<dyn Cache>> + Send + Sync>;
type BlobBuilder = Box<dyn Fn(&BlobConfig) -> StorageResult<Arc<dyn BlobStore>> + Send + Sync>;

/// The resolved stores handed to the agent's service container.
#[derive(Clone)]
pub struct StorageHandles {
    /// Durable K/V + relational store.
    pub database: Arc<dyn Database>,
    /// TTL'd cache.
    pub cache: Arc<dyn Cache>,
    /// Content-addressed blob store.
    pub blob: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles").finish_non_exhaustive()
    }
}

/// Builds [`StorageHandles`] from a validated config.
#[derive(Default)]
pub struct StorageFactory {
    database_builder: Option<DatabaseBuilder>,
    cache_builder: Option<CacheBuilder>,
    blob_builder: Option<BlobBuilder>,
}

impl StorageFactory {
    /// Create a factory that can resolve the in-memory variants only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a builder for non-memory database variants.
    #[must_use]
    pub fn with_database_builder(
        mut self,
        builder: impl Fn(&DatabaseConfig) -> StorageResult<Arc<dyn Database>> + Send + Sync + 'static,
    ) -> Self {
        self.database_builder = Some(Box::new(builder));
        self
    }

    /// Install a builder for non-memory cache variants.
    #[must_use]
    pub fn with_cache_builder(
        mut self,
        builder: impl Fn(&CacheConfig) -> StorageResult<Arc<dyn Cache>> + Send + Sync + 'static,
    ) -> Self {
        self.cache_builder = Some(Box::new(builder));
        self
    }

    /// Install a builder for non-memory blob variants.
    #[must_use]
    pub fn with_blob_builder(
        mut self,
        builder: impl Fn(&BlobConfig) -> StorageResult<Arc<dyn BlobStore>> + Send + Sync + 'static,
    ) -> Self {
        self.blob_builder = Some(Box::new(builder));
        self
    }

    /// Resolve the configured variants into live stores.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackendUnavailable`] when a non-memory
    /// variant is configured and no builder is installed for it, or
    /// whatever error the installed builder reports.
    pub fn build(&self, config: &StorageConfig, logger: &Logger) -> StorageResult<StorageHandles> {
        let database: Arc<dyn Database> = match &config.database {
            DatabaseConfig::InMemory => Arc::new(MemoryDatabase::new()),
            other => self
                .database_builder
                .as_ref()
                .ok_or_else(|| StorageError::BackendUnavailable {
                    kind: "database".to_owned(),
                    variant: variant_tag(other),
                })
                .and_then(|b| b(other))?,
        };

        let cache: Arc<dyn Cache> = match &config.cache {
            CacheConfig::InMemory => Arc::new(MemoryCache::new()),
            other @ CacheConfig::Redis { .. } => self
                .cache_builder
                .as_ref()
                .ok_or_else(|| StorageError::BackendUnavailable {
                    kind: "cache".to_owned(),
                    variant: "redis".to_owned(),
                })
                .and_then(|b| b(other))?,
        };

        let blob: Arc<dyn BlobStore> = match &config.blob {
            BlobConfig::InMemory {
                max_blob_bytes,
                max_total_bytes,
            } => Arc::new(MemoryBlobStore::new(*max_blob_bytes, *max_total_bytes)),
            other => self
                .blob_builder
                .as_ref()
                .ok_or_else(|| StorageError::BackendUnavailable {
                    kind: "blob".to_owned(),
                    variant: blob_variant_tag(other),
                })
                .and_then(|b| b(other))?,
        };

        logger.child("storage", []).info(
            "Storage resolved",
            Some(json!({
                "database": variant_tag(&config.database),
                "cache": match &config.cache {
                    CacheConfig::InMemory => "in-memory",
                    CacheConfig::Redis { .. } => "redis",
                },
                "blob": blob_variant_tag(&config.blob),
            })),
        );

        Ok(StorageHandles {
            database,
            cache,
            blob,
        })
    }
}

fn variant_tag(config: &DatabaseConfig) -> String {
    match config {
        DatabaseConfig::InMemory => "in-memory".to_owned(),
        DatabaseConfig::Sqlite { .. } => "sqlite".to_owned(),
        DatabaseConfig::Postgres { .. } => "postgres".to_owned(),
    }
}

fn blob_variant_tag(config: &BlobConfig) -> String {
    match config {
        BlobConfig::InMemory { .. } => "in-memory".to_owned(),
        BlobConfig::Local { .. } => "local".to_owned(),
        BlobConfig::S3 { .. } => "s3".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexto_core::AgentId;
    use dexto_logger::LogLevel;

    fn logger() -> Logger {
        Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error)
    }

    #[test]
    fn test_memory_config_resolves() {
        let factory = StorageFactory::new();
        let handles = factory.build(&StorageConfig::default(), &logger());
        assert!(handles.is_ok());
    }

    #[test]
    fn test_missing_builder_reported() {
        let factory = StorageFactory::new();
        let config = StorageConfig {
            database: DatabaseConfig::Sqlite {
                path: "/tmp/db.sqlite".to_owned(),
            },
            ..StorageConfig::default()
        };
        let result = factory.build(&config, &logger());
        assert!(matches!(
            result,
            Err(StorageError::BackendUnavailable { kind, variant })
                if kind == "database" && variant == "sqlite"
        ));
    }

    #[test]
    fn test_installed_builder_used() {
        let factory = StorageFactory::new().with_database_builder(|_config| {
            Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn Database>)
        });
        let config = StorageConfig {
            database: DatabaseConfig::Postgres {
                url: "postgres://localhost/dexto".to_owned(),
            },
            ..StorageConfig::default()
        };
        assert!(factory.build(&config, &logger()).is_ok());
    }
}
