//! vox-sync - process-local cache for voice-reader settings and dictionaries
//! kept consistent with PostgreSQL through `LISTEN`/`NOTIFY`.
//!
//! ## Architecture
//!
//! - `cache` - Bounded TTL/LRU caches and the typed domain cache
//! - `config` - Environment configuration
//! - `database` - PostgreSQL storage, schema, models and repositories
//! - `events` - Change feed: decoding, dispatch, reconnects and resync
//! - `gateway` - Read-through / write-through façade for collaborators
//! - `runtime` - Wiring and lifecycle

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod gateway;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, DomainCache};
pub use config::Config;
pub use error::{StorageError, StorageResult};
pub use gateway::{BoostPolicy, PersistenceGateway};
pub use runtime::SyncRuntime;
