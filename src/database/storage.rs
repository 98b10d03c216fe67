//! Storage seam between the cache layer and the relational store.

use std::collections::HashMap;

use async_trait::async_trait;

use super::models::{Dictionary, GuildSettings, UserVoiceProfile};
use crate::error::StorageResult;

/// Authoritative store for every cached entity.
///
/// `Ok(None)` means "no row"; errors are reserved for the store being
/// unreachable or a query failing.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch_guild_settings(&self, guild_id: i64) -> StorageResult<Option<GuildSettings>>;

    /// Upsert, replacing the whole document.
    async fn store_guild_settings(&self, guild_id: i64, settings: &GuildSettings) -> StorageResult<()>;

    async fn fetch_all_guild_settings(&self) -> StorageResult<Vec<(i64, GuildSettings)>>;

    async fn fetch_user_profile(&self, user_id: i64) -> StorageResult<Option<UserVoiceProfile>>;

    async fn store_user_profile(&self, user_id: i64, profile: &UserVoiceProfile) -> StorageResult<()>;

    async fn fetch_all_user_profiles(&self) -> StorageResult<Vec<(i64, UserVoiceProfile)>>;

    async fn fetch_dictionary(&self, owner_id: i64) -> StorageResult<Option<Dictionary>>;

    /// Upsert, replacing the whole mapping.
    async fn store_dictionary(&self, owner_id: i64, dictionary: &Dictionary) -> StorageResult<()>;

    async fn fetch_boost_count(&self, guild_id: i64) -> StorageResult<i64>;

    /// Boost counts for every guild with at least one boost.
    async fn fetch_boost_counts(&self) -> StorageResult<HashMap<i64, i64>>;

    /// Record a boost and return the guild's post-write count.
    async fn grant_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<i64>;

    /// Remove one boost by `user_id`. Returns the post-write count, or
    /// `None` if the user had no boost on that guild.
    async fn revoke_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<Option<i64>>;
}
