//! Boost count repository.
//!
//! Counts are always absolute: writes return the post-write count and the
//! change feed carries the same value, so duplicate delivery is harmless.

use std::sync::Arc;

use tracing::debug;

use crate::cache::DomainCache;
use crate::database::storage::Storage;
use crate::error::StorageResult;

/// Repository for per-guild boost counts.
#[derive(Clone)]
pub struct BoostRepository {
    storage: Arc<dyn Storage>,
    cache: Arc<DomainCache>,
}

impl BoostRepository {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<DomainCache>) -> Self {
        Self { storage, cache }
    }

    /// Boost count for a guild, zero if it has none.
    pub async fn count(&self, guild_id: i64) -> StorageResult<i64> {
        if let Some(count) = self.cache.boost_count(guild_id) {
            return Ok(count);
        }

        let ticket = self.cache.read_ticket();
        let count = self.storage.fetch_boost_count(guild_id).await?;
        self.cache.fill_boost_count(guild_id, count, ticket);
        Ok(count)
    }

    pub async fn is_boosted(&self, guild_id: i64) -> StorageResult<bool> {
        Ok(self.count(guild_id).await? > 0)
    }

    /// Record a boost and write the new count through.
    pub async fn grant(&self, guild_id: i64, user_id: i64) -> StorageResult<i64> {
        let count = self.storage.grant_boost(guild_id, user_id).await?;
        self.cache.set_boost_count(guild_id, count);
        Ok(count)
    }

    /// Remove a boost. Returns the new count, or `None` if `user_id` had no
    /// boost on this guild.
    pub async fn revoke(&self, guild_id: i64, user_id: i64) -> StorageResult<Option<i64>> {
        let count = self.storage.revoke_boost(guild_id, user_id).await?;
        if let Some(count) = count {
            self.cache.set_boost_count(guild_id, count);
        }
        Ok(count)
    }

    /// Replace cached counts with a bulk read.
    ///
    /// Cached guilds missing from the bulk result have no boosts left and
    /// are set to zero. Counts that changed during the read are left alone.
    /// Returns the number of guilds written.
    pub async fn refresh_all(&self) -> StorageResult<usize> {
        let ticket = self.cache.read_ticket();
        let counts = self.storage.fetch_boost_counts().await?;
        let mut written = 0;

        for guild_id in self.cache.boost_guilds() {
            if !counts.contains_key(&guild_id) && self.cache.fill_boost_count(guild_id, 0, ticket) {
                written += 1;
            }
        }
        for (guild_id, count) in counts {
            if self.cache.fill_boost_count(guild_id, count, ticket) {
                written += 1;
            }
        }

        debug!("Boost counts refreshed for {} guilds", written);
        Ok(written)
    }
}
