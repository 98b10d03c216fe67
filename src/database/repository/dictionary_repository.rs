//! Dictionary repository.
//!
//! Guild dictionaries are only cached while the guild has a live session.
//! The global dictionary is always cached and never evicted.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::DomainCache;
use crate::database::models::Dictionary;
use crate::database::storage::Storage;
use crate::error::StorageResult;

/// Repository for reading dictionaries.
#[derive(Clone)]
pub struct DictionaryRepository {
    storage: Arc<dyn Storage>,
    cache: Arc<DomainCache>,
}

impl DictionaryRepository {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<DomainCache>) -> Self {
        Self { storage, cache }
    }

    /// Get a dictionary, empty if not stored.
    ///
    /// Misses for guilds outside the active set are served from storage
    /// without being cached.
    pub async fn get(&self, owner_id: i64) -> StorageResult<Arc<Dictionary>> {
        if let Some(dictionary) = self.cache.dictionary(owner_id) {
            return Ok(dictionary);
        }
        self.refresh(owner_id).await
    }

    /// Fetch from storage unconditionally and cache the result if eligible.
    ///
    /// The result is returned but not cached when the dictionary changed
    /// while the fetch was in flight.
    pub async fn refresh(&self, owner_id: i64) -> StorageResult<Arc<Dictionary>> {
        let ticket = self.cache.read_ticket();
        let dictionary = Arc::new(
            self.storage
                .fetch_dictionary(owner_id)
                .await?
                .unwrap_or_default(),
        );

        let cached = self.cache.fill_dictionary(owner_id, Arc::clone(&dictionary), ticket);
        if !cached && self.cache.is_active(owner_id) {
            debug!("Dictionary {} changed during fetch, not caching", owner_id);
        }

        Ok(dictionary)
    }

    /// Replace a dictionary.
    ///
    /// Other processes learn about the write from the change feed. Locally the
    /// global dictionary is written through and an active guild's entry is
    /// flagged so the next read refetches it.
    pub async fn save(&self, owner_id: i64, dictionary: Dictionary) -> StorageResult<()> {
        self.storage.store_dictionary(owner_id, &dictionary).await?;

        if self.cache.is_global(owner_id) {
            self.cache.set_dictionary(owner_id, Arc::new(dictionary));
        } else {
            self.cache.mark_needs_reload(owner_id);
        }

        debug!("Dictionary saved for {}", owner_id);
        Ok(())
    }

    /// Add or replace a single reading.
    pub async fn add_word(&self, owner_id: i64, word: &str, reading: &str) -> StorageResult<()> {
        let mut dictionary = Dictionary::clone(&*self.get(owner_id).await?);
        dictionary.insert(word, reading);
        self.save(owner_id, dictionary).await
    }

    /// Remove a single reading. Returns `false` if the word was not present.
    pub async fn remove_word(&self, owner_id: i64, word: &str) -> StorageResult<bool> {
        let mut dictionary = Dictionary::clone(&*self.get(owner_id).await?);
        if dictionary.remove(word).is_none() {
            return Ok(false);
        }
        self.save(owner_id, dictionary).await?;
        Ok(true)
    }

    /// Mark a guild active and make sure its dictionary is cached.
    pub async fn load_for_session(&self, guild_id: i64) -> StorageResult<()> {
        self.cache.mark_active(guild_id);

        if self.cache.is_loaded(guild_id) {
            return Ok(());
        }

        let dictionary = self.refresh(guild_id).await?;
        info!(
            "[{}] Dictionary loaded for voice session ({} entries)",
            guild_id,
            dictionary.len()
        );
        Ok(())
    }

    /// Mark a guild inactive and drop its dictionary from memory.
    pub fn unload_for_session(&self, guild_id: i64) {
        self.cache.mark_inactive(guild_id);
        info!("[{}] Dictionary unloaded after voice session", guild_id);
    }
}
