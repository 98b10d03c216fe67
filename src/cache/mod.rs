//! Cache module - bounded in-memory caches for synced entities.
//!
//! ## Architecture
//!
//! - `BoundedCache` - Generic keyed cache with TTL expiry and LRU eviction
//! - `DomainCache` - One bounded cache per entity kind, plus the global
//!   dictionary and the set of guilds with a live session
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = DomainCache::new(global_dict_id, DomainCacheConfig::default());
//!
//! cache.set_guild_settings(guild_id, settings);
//! let settings = cache.guild_settings(guild_id);
//! ```

mod bounded;
mod change_log;
mod config;
mod domain;

pub use bounded::BoundedCache;
pub use change_log::ReadTicket;
pub use config::{CacheConfig, DomainCacheConfig};
pub use domain::{CacheStats, DomainCache};
