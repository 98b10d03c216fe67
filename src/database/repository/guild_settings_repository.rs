//! Guild settings repository with read-through / write-through caching.

use std::sync::Arc;

use tracing::debug;

use crate::cache::DomainCache;
use crate::database::models::GuildSettings;
use crate::database::storage::Storage;
use crate::error::StorageResult;

/// Repository for guild settings.
#[derive(Clone)]
pub struct GuildSettingsRepository {
    storage: Arc<dyn Storage>,
    cache: Arc<DomainCache>,
}

impl GuildSettingsRepository {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<DomainCache>) -> Self {
        Self { storage, cache }
    }

    /// Get settings, returning (and caching) defaults if not stored.
    pub async fn get_or_default(&self, guild_id: i64) -> StorageResult<GuildSettings> {
        if let Some(settings) = self.cache.guild_settings(guild_id) {
            return Ok(settings);
        }

        let ticket = self.cache.read_ticket();
        let settings = self
            .storage
            .fetch_guild_settings(guild_id)
            .await?
            .unwrap_or_default();
        if !self.cache.fill_guild_settings(guild_id, settings.clone(), ticket) {
            debug!("Guild settings for {} changed during fetch, not caching", guild_id);
        }

        Ok(settings)
    }

    /// Save settings (upsert), then update the cache.
    pub async fn save(&self, guild_id: i64, settings: &GuildSettings) -> StorageResult<()> {
        self.storage.store_guild_settings(guild_id, settings).await?;
        self.cache.set_guild_settings(guild_id, settings.clone());
        debug!("Guild settings written through for {}", guild_id);
        Ok(())
    }

    /// Load every stored row into the cache. Returns the row count.
    pub async fn preload(&self) -> StorageResult<usize> {
        let ticket = self.cache.read_ticket();
        let rows = self.storage.fetch_all_guild_settings().await?;
        let count = rows.len();
        for (guild_id, settings) in rows {
            self.cache.fill_guild_settings(guild_id, settings, ticket);
        }
        Ok(count)
    }
}
