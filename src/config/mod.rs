//! Configuration module for vox-sync.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::cache::DomainCacheConfig;
use crate::database::DbConfig;
use crate::events::FeedConfig;
use crate::gateway::BoostPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // PostgreSQL
    pub database: DbConfig,

    // Change feed
    pub feed: FeedConfig,

    // Cache
    pub cache: DomainCacheConfig,
    /// Bulk-load the cache before listening
    pub warm_up: bool,
    /// Owner id of the dictionary shared by every guild
    pub global_dict_id: i64,

    // Premium gating
    pub boost_policy: BoostPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `.env` is expected to have been loaded by the caller.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns error if a required variable is missing or a value does not parse.
    pub fn from_source<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source(lookup);

        let defaults = DbConfig::default();
        let database = DbConfig {
            host: source.string_or("POSTGRES_HOST", &defaults.host),
            port: source.parse_or("POSTGRES_PORT", defaults.port)?,
            dbname: source.required("POSTGRES_DB")?,
            user: source.required("POSTGRES_USER")?,
            password: source.string_or("POSTGRES_PASSWORD", ""),
            max_size: source.parse_or("POSTGRES_POOL_SIZE", defaults.max_size)?,
            ..defaults
        };
        if database.max_size == 0 {
            bail!("POSTGRES_POOL_SIZE must be at least 1");
        }

        let defaults = FeedConfig::default();
        let feed = FeedConfig {
            channel: source.string_or("NOTIFY_CHANNEL", &defaults.channel),
            health_check_interval: source
                .secs_or("FEED_HEALTH_CHECK_SECS", defaults.health_check_interval)?,
            max_reconnect_attempts: source
                .parse_or("FEED_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts)?,
            reconnect_delay: source.secs_or("FEED_RECONNECT_DELAY_SECS", defaults.reconnect_delay)?,
            buffer: source.parse_or("FEED_BUFFER", defaults.buffer)?,
        };
        if feed.health_check_interval.is_zero() {
            bail!("FEED_HEALTH_CHECK_SECS must be greater than zero");
        }

        // Without an override each kind keeps its own preset TTL.
        let cache = match source.get("CACHE_TTL_SECS") {
            Some(_) => DomainCacheConfig::default()
                .with_ttl(source.secs_or("CACHE_TTL_SECS", Duration::ZERO)?),
            None => DomainCacheConfig::default(),
        };

        Ok(Self {
            database,
            feed,
            cache,
            warm_up: source.flag_or("CACHE_WARM_UP", true)?,
            global_dict_id: source.parse_or("GLOBAL_DICT_ID", 0)?,
            boost_policy: BoostPolicy {
                skip_premium_check: source.flag_or("SKIP_PREMIUM_CHECK", false)?,
                min_boost_level: source.parse_or("MIN_BOOST_LEVEL", 0)?,
            },
        })
    }
}

struct Source<F>(F);

impl<F: Fn(&str) -> Option<String>> Source<F> {
    /// Trimmed value, with empty strings treated as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.get(key).with_context(|| format!("{key} must be set"))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(value) => value
                .parse()
                .with_context(|| format!("invalid value for {key}: '{value}'")),
            None => Ok(default),
        }
    }

    fn secs_or(&self, key: &str, default: Duration) -> anyhow::Result<Duration> {
        self.parse_or::<u64>(key, default.as_secs())
            .map(Duration::from_secs)
    }

    fn flag_or(&self, key: &str, default: bool) -> anyhow::Result<bool> {
        match self.get(key).map(|value| value.to_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => bail!("invalid value for {key}: '{value}' (expected true/false)"),
            },
        }
    }
}
