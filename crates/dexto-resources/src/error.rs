//! Resource loading error taxonomy.

use thiserror::Error;

/// Errors surfaced by resource loaders.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The URI could not be parsed or lacks a scheme.
    #[error("invalid resource URI {uri}: {reason}")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Parser message.
        reason: String,
    },

    /// No loader supports this URI against this data source.
    #[error("no loader supports {uri} against data source type {source_type}")]
    UnsupportedScheme {
        /// The URI.
        uri: String,
        /// The data source's type tag.
        source_type: String,
    },

    /// The resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The resource resolves outside the data source's boundary.
    #[error("access denied: {uri} escapes data source root")]
    AccessDenied {
        /// The offending URI.
        uri: String,
    },

    /// Filesystem or network I/O failed.
    #[error("resource I/O error for {uri}: {reason}")]
    Io {
        /// The URI being loaded.
        uri: String,
        /// Underlying message.
        reason: String,
    },

    /// The remote end answered with a non-success status.
    #[error("HTTP {status} fetching {uri}")]
    HttpStatus {
        /// The URI being fetched.
        uri: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
