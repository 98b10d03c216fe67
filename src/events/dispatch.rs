//! Applies change events to the domain cache.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::change::{ChangeEvent, EntityKind};
use crate::cache::DomainCache;
use crate::database::{DictionaryRepository, GuildSettings, Storage, UserVoiceProfile};

/// Routes each change to the handler for its entity kind.
///
/// Handlers never fail: anything that cannot be applied is logged and the
/// affected entry is invalidated so the next read goes to storage.
#[derive(Clone)]
pub struct ChangeDispatcher {
    cache: Arc<DomainCache>,
    dictionaries: DictionaryRepository,
}

impl ChangeDispatcher {
    pub fn new(cache: Arc<DomainCache>, storage: Arc<dyn Storage>) -> Self {
        Self {
            dictionaries: DictionaryRepository::new(storage, Arc::clone(&cache)),
            cache,
        }
    }

    /// Decode and apply a raw notification payload.
    pub async fn dispatch_raw(&self, raw: &str) {
        match ChangeEvent::decode(raw) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => warn!("Ignoring change notification: {} (payload: {})", e, raw),
        }
    }

    pub async fn dispatch(&self, event: ChangeEvent) {
        debug!("Change event: {} {:?} {}", event.kind, event.operation, event.id);

        match event.kind {
            EntityKind::GuildSettings => self.apply_guild_settings(event),
            EntityKind::UserProfile => self.apply_user_profile(event),
            EntityKind::Dictionary => self.apply_dictionary(event).await,
            EntityKind::BoostCount => self.apply_boost_count(event),
        }
    }

    fn apply_guild_settings(&self, event: ChangeEvent) {
        match decode_row::<GuildSettings>(&event) {
            Some(settings) => self.cache.set_guild_settings(event.id, settings),
            None => {
                self.cache.invalidate_guild_settings(event.id);
            }
        }
    }

    fn apply_user_profile(&self, event: ChangeEvent) {
        match decode_row::<UserVoiceProfile>(&event) {
            Some(profile) => self.cache.set_user_profile(event.id, profile),
            None => {
                self.cache.invalidate_user_profile(event.id);
            }
        }
    }

    async fn apply_dictionary(&self, event: ChangeEvent) {
        let id = event.id;

        if self.cache.is_global(id) {
            // Deleted rows refetch as an empty dictionary.
            self.cache.record_dictionary_change(id);
            if let Err(e) = self.dictionaries.refresh(id).await {
                warn!("Failed to refresh global dictionary, keeping previous value: {}", e);
            }
            return;
        }

        if !self.cache.mark_needs_reload(id) {
            debug!("Dictionary change for inactive guild {} ignored", id);
        }
    }

    fn apply_boost_count(&self, event: ChangeEvent) {
        let count = event
            .payload
            .as_ref()
            .and_then(|data| data.get("count"))
            .and_then(Value::as_i64)
            .filter(|count| *count >= 0);

        match count {
            Some(count) => self.cache.set_boost_count(event.id, count),
            None => {
                warn!("Boost change for {} without a usable count, invalidating", event.id);
                self.cache.invalidate_boost_count(event.id);
            }
        }
    }
}

/// Full row carried by an INSERT/UPDATE, or `None` for deletes, missing data
/// and rows that fail to decode.
fn decode_row<T: serde::de::DeserializeOwned>(event: &ChangeEvent) -> Option<T> {
    if event.is_delete() {
        return None;
    }
    let data = event.payload.clone()?;
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Undecodable {} row for {}, invalidating: {}", event.kind, event.id, e);
            None
        }
    }
}
