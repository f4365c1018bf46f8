//! Dexto Storage - Contracts and in-memory backends for the three
//! orthogonal stores.
//!
//! - [`Database`]: durable K/V with scan, plus SQL surface and a
//!   serializable transaction primitive on SQL-capable variants
//! - [`Cache`]: TTL'd K/V with lazy expiry and an optional sweeper
//! - [`BlobStore`]: content-addressed bytes behind opaque handles
//!
//! The [`StorageFactory`] resolves an already-enriched [`StorageConfig`]
//! into live stores. In-memory variants are built here; remote variants
//! are installed by the enrichment layer as builder callbacks, because the core
//! never resolves paths or opens connections on its own behalf.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod blob;
mod cache;
mod database;
mod error;
mod factory;

pub use blob::{BlobHandle, BlobMeta, BlobRecord, BlobStore, MemoryBlobStore};
pub use cache::{Cache, MemoryCache};
pub use database::{Database, MemoryDatabase, Transaction, TransactionFn};
pub use error::{StorageError, StorageResult};
pub use factory::{StorageFactory, StorageHandles};
