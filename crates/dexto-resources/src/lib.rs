//! Dexto Resources - URI loading against named data sources.
//!
//! The core consumes the [`ResourceLoader`] trait only; implementations
//! are injected at construction time. URIs are absolute and must carry a
//! scheme; each load names the [`DataSourceConfig`] it resolves against,
//! and the schema layer has already cross-checked scheme against source
//! type.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod fs;
mod http;
mod loader;
mod memory;

pub use error::{ResourceError, ResourceResult};
pub use fs::FsLoader;
pub use http::HttpLoader;
pub use loader::{CompositeLoader, ResourceContent, ResourceLoader};
pub use memory::MemoryLoader;
