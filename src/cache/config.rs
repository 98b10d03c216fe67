//! Cache configuration.

use std::time::Duration;

/// Configuration for a single bounded cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: usize,

    /// Time-to-live for cache entries, measured from insertion.
    /// Expired entries read as absent and are dropped on the next eviction pass.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set max capacity for cache (builder pattern).
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Set time-to-live for cache entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Disable TTL (entries never expire based on time).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Guild settings: read on every message, changed rarely.
    pub fn guild_settings() -> Self {
        Self {
            max_capacity: 5_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }

    /// Per-user voice profiles. Many keys, tiny values.
    pub fn user_profiles() -> Self {
        Self {
            max_capacity: 20_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }

    /// Boost counts. Kept short so a missed event heals quickly.
    pub fn boost_counts() -> Self {
        Self {
            max_capacity: 5_000,
            ttl: Some(Duration::from_secs(600)), // 10 minutes
        }
    }

    /// Per-guild dictionaries. Potentially large, only held for live sessions.
    pub fn dictionaries() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
        }
    }
}

/// Per-kind configuration for [`DomainCache`](super::DomainCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainCacheConfig {
    pub guild_settings: CacheConfig,
    pub user_profiles: CacheConfig,
    pub boost_counts: CacheConfig,
    pub dictionaries: CacheConfig,
}

impl Default for DomainCacheConfig {
    fn default() -> Self {
        Self {
            guild_settings: CacheConfig::guild_settings(),
            user_profiles: CacheConfig::user_profiles(),
            boost_counts: CacheConfig::boost_counts(),
            dictionaries: CacheConfig::dictionaries(),
        }
    }
}

impl DomainCacheConfig {
    /// Override the TTL of every kind.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.guild_settings = self.guild_settings.ttl(ttl);
        self.user_profiles = self.user_profiles.ttl(ttl);
        self.boost_counts = self.boost_counts.ttl(ttl);
        self.dictionaries = self.dictionaries.ttl(ttl);
        self
    }
}
