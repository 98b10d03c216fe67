//! User voice profile repository.

use std::sync::Arc;

use tracing::debug;

use crate::cache::DomainCache;
use crate::database::models::UserVoiceProfile;
use crate::database::storage::Storage;
use crate::error::StorageResult;

/// Repository for user voice profiles.
#[derive(Clone)]
pub struct UserProfileRepository {
    storage: Arc<dyn Storage>,
    cache: Arc<DomainCache>,
}

impl UserProfileRepository {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<DomainCache>) -> Self {
        Self { storage, cache }
    }

    /// Get a profile, returning (and caching) defaults if not stored.
    pub async fn get_or_default(&self, user_id: i64) -> StorageResult<UserVoiceProfile> {
        if let Some(profile) = self.cache.user_profile(user_id) {
            return Ok(profile);
        }

        let ticket = self.cache.read_ticket();
        let profile = self
            .storage
            .fetch_user_profile(user_id)
            .await?
            .unwrap_or_default();
        if !self.cache.fill_user_profile(user_id, profile, ticket) {
            debug!("User profile for {} changed during fetch, not caching", user_id);
        }

        Ok(profile)
    }

    /// Save a profile (upsert), then update the cache.
    pub async fn save(&self, user_id: i64, profile: &UserVoiceProfile) -> StorageResult<()> {
        self.storage.store_user_profile(user_id, profile).await?;
        self.cache.set_user_profile(user_id, *profile);
        debug!("User profile written through for {}", user_id);
        Ok(())
    }

    pub async fn preload(&self) -> StorageResult<usize> {
        let ticket = self.cache.read_ticket();
        let rows = self.storage.fetch_all_user_profiles().await?;
        let count = rows.len();
        for (user_id, profile) in rows {
            self.cache.fill_user_profile(user_id, profile, ticket);
        }
        Ok(count)
    }
}
