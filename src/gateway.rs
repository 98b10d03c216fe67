//! Persistence gateway: the façade collaborators use to read and write
//! settings, profiles, dictionaries and boost counts.
//!
//! Reads are served from [`DomainCache`] when possible and fall through to
//! storage on a miss. Writes persist first, then update the cache according
//! to each entity's policy (see the individual repositories).

use std::sync::Arc;

use tracing::info;

use crate::cache::DomainCache;
use crate::database::{
    BoostRepository, Dictionary, DictionaryRepository, GuildSettings, GuildSettingsRepository,
    Storage, UserProfileRepository, UserVoiceProfile,
};
use crate::error::StorageResult;

/// Premium gating rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoostPolicy {
    /// Treat every guild as active regardless of boosts.
    pub skip_premium_check: bool,
    /// Boost level required; level `n` needs `n + 1` boosts. Zero disables gating.
    pub min_boost_level: u32,
}

impl BoostPolicy {
    /// True when no boost lookup is needed to decide activity.
    pub fn is_open(&self) -> bool {
        self.skip_premium_check || self.min_boost_level == 0
    }

    pub fn allows(&self, boost_count: i64) -> bool {
        self.is_open() || boost_count > i64::from(self.min_boost_level)
    }
}

/// Counts from a startup warm-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    pub guild_settings: usize,
    pub user_profiles: usize,
    pub boost_counts: usize,
    pub global_dictionary_entries: usize,
}

/// Read-through / write-through access to every cached entity.
#[derive(Clone)]
pub struct PersistenceGateway {
    cache: Arc<DomainCache>,
    guild_settings: GuildSettingsRepository,
    user_profiles: UserProfileRepository,
    dictionaries: DictionaryRepository,
    boosts: BoostRepository,
    policy: BoostPolicy,
}

impl PersistenceGateway {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<DomainCache>, policy: BoostPolicy) -> Self {
        Self {
            guild_settings: GuildSettingsRepository::new(Arc::clone(&storage), Arc::clone(&cache)),
            user_profiles: UserProfileRepository::new(Arc::clone(&storage), Arc::clone(&cache)),
            dictionaries: DictionaryRepository::new(Arc::clone(&storage), Arc::clone(&cache)),
            boosts: BoostRepository::new(storage, Arc::clone(&cache)),
            cache,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<DomainCache> {
        &self.cache
    }

    pub fn policy(&self) -> BoostPolicy {
        self.policy
    }

    // ========================================================================
    // Guild settings
    // ========================================================================

    pub async fn get_guild_settings(&self, guild_id: i64) -> StorageResult<GuildSettings> {
        self.guild_settings.get_or_default(guild_id).await
    }

    pub async fn set_guild_settings(&self, guild_id: i64, settings: &GuildSettings) -> StorageResult<()> {
        self.guild_settings.save(guild_id, settings).await
    }

    // ========================================================================
    // User profiles
    // ========================================================================

    pub async fn get_user_profile(&self, user_id: i64) -> StorageResult<UserVoiceProfile> {
        self.user_profiles.get_or_default(user_id).await
    }

    pub async fn set_user_profile(&self, user_id: i64, profile: &UserVoiceProfile) -> StorageResult<()> {
        self.user_profiles.save(user_id, profile).await
    }

    // ========================================================================
    // Dictionaries
    // ========================================================================

    /// Dictionary for `owner_id`, empty if none is stored.
    pub async fn get_dictionary(&self, owner_id: i64) -> StorageResult<Arc<Dictionary>> {
        self.dictionaries.get(owner_id).await
    }

    pub async fn set_dictionary(&self, owner_id: i64, dictionary: Dictionary) -> StorageResult<()> {
        self.dictionaries.save(owner_id, dictionary).await
    }

    pub async fn add_word(&self, owner_id: i64, word: &str, reading: &str) -> StorageResult<()> {
        self.dictionaries.add_word(owner_id, word, reading).await
    }

    pub async fn remove_word(&self, owner_id: i64, word: &str) -> StorageResult<bool> {
        self.dictionaries.remove_word(owner_id, word).await
    }

    /// A voice session started in `guild_id`: keep its dictionary cached.
    pub async fn load_for_session(&self, guild_id: i64) -> StorageResult<()> {
        self.dictionaries.load_for_session(guild_id).await
    }

    /// The voice session in `guild_id` ended: drop its dictionary.
    pub fn unload_for_session(&self, guild_id: i64) {
        self.dictionaries.unload_for_session(guild_id);
    }

    // ========================================================================
    // Boosts
    // ========================================================================

    pub async fn get_boost_count(&self, guild_id: i64) -> StorageResult<i64> {
        self.boosts.count(guild_id).await
    }

    pub async fn is_boosted(&self, guild_id: i64) -> StorageResult<bool> {
        self.boosts.is_boosted(guild_id).await
    }

    pub async fn grant_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<i64> {
        self.boosts.grant(guild_id, user_id).await
    }

    pub async fn revoke_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<Option<i64>> {
        self.boosts.revoke(guild_id, user_id).await
    }

    /// Whether this instance should serve `guild_id` under the boost policy.
    pub async fn is_instance_active(&self, guild_id: i64) -> StorageResult<bool> {
        if self.policy.is_open() {
            return Ok(true);
        }
        Ok(self.policy.allows(self.get_boost_count(guild_id).await?))
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Bulk-load settings, profiles, boost counts and the global dictionary.
    ///
    /// Rows beyond a cache's capacity are evicted as they are inserted.
    pub async fn warm_up(&self) -> StorageResult<WarmUpReport> {
        let guild_settings = self.guild_settings.preload().await?;
        let user_profiles = self.user_profiles.preload().await?;
        let boost_counts = self.boosts.refresh_all().await?;
        let global = self.dictionaries.refresh(self.cache.global_dict_id()).await?;

        let report = WarmUpReport {
            guild_settings,
            user_profiles,
            boost_counts,
            global_dictionary_entries: global.len(),
        };
        info!(
            "Cache warmed up: {} guild settings, {} user profiles, {} boost counts, {} global dictionary entries",
            report.guild_settings,
            report.user_profiles,
            report.boost_counts,
            report.global_dictionary_entries
        );
        Ok(report)
    }
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish()
    }
}
