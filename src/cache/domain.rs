//! Typed cache for guild settings, user profiles, boost counts and dictionaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::change_log::{ChangeLog, ReadTicket};
use super::{BoundedCache, DomainCacheConfig};
use crate::database::{Dictionary, GuildSettings, UserVoiceProfile};

/// Stamped changes kept before the log is reset.
const CHANGE_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    GuildSettings,
    UserProfile,
    BoostCount,
    Dictionary,
}

/// Snapshot of cache occupancy for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub guild_settings: usize,
    pub user_profiles: usize,
    pub boost_counts: usize,
    pub dictionaries_loaded: usize,
    pub global_dictionary_loaded: bool,
    pub active_guilds: usize,
    pub pending_dictionary_reloads: usize,
    pub version: u64,
    pub last_resync_at: Option<DateTime<Utc>>,
}

/// All process-local cached state.
///
/// Every mutation goes through these methods; the locking lives in the
/// underlying [`BoundedCache`]s and concurrent sets.
///
/// Writers that know the current value (`set_*`, `invalidate_*`, reload
/// flags) always win. Read-through results go through the `fill_*` methods
/// with a [`ReadTicket`] taken before the storage read, and are dropped if
/// the key changed while the read was in flight.
pub struct DomainCache {
    guild_settings: BoundedCache<i64, GuildSettings>,
    user_profiles: BoundedCache<i64, UserVoiceProfile>,
    boost_counts: BoundedCache<i64, i64>,
    dictionaries: BoundedCache<i64, Arc<Dictionary>>,

    global_dict_id: i64,
    global_dict: RwLock<Option<Arc<Dictionary>>>,

    /// Guilds with a live voice session.
    active_guilds: DashSet<i64>,
    /// Cached dictionaries known to be out of date.
    pending_reload: DashSet<i64>,

    changes: ChangeLog<(Slot, i64)>,

    version: AtomicU64,
    last_resync_at: RwLock<Option<DateTime<Utc>>>,
}

impl DomainCache {
    pub fn new(global_dict_id: i64, config: DomainCacheConfig) -> Self {
        info!("Domain cache initialized (global dictionary id {})", global_dict_id);
        Self {
            guild_settings: BoundedCache::new("guild_settings", config.guild_settings),
            user_profiles: BoundedCache::new("user_profiles", config.user_profiles),
            boost_counts: BoundedCache::new("boost_counts", config.boost_counts),
            dictionaries: BoundedCache::new("dictionaries", config.dictionaries),
            global_dict_id,
            global_dict: RwLock::new(None),
            active_guilds: DashSet::new(),
            pending_reload: DashSet::new(),
            changes: ChangeLog::new(CHANGE_LOG_CAPACITY),
            version: AtomicU64::new(0),
            last_resync_at: RwLock::new(None),
        }
    }

    pub fn global_dict_id(&self) -> i64 {
        self.global_dict_id
    }

    pub fn is_global(&self, id: i64) -> bool {
        id == self.global_dict_id
    }

    /// Take before reading from storage; pass to a `fill_*` method afterwards.
    pub fn read_ticket(&self) -> ReadTicket {
        self.changes.ticket()
    }

    // ========================================================================
    // Guild settings
    // ========================================================================

    pub fn guild_settings(&self, guild_id: i64) -> Option<GuildSettings> {
        self.guild_settings.get(&guild_id)
    }

    pub fn set_guild_settings(&self, guild_id: i64, settings: GuildSettings) {
        self.changes.record((Slot::GuildSettings, guild_id));
        self.guild_settings.insert(guild_id, settings);
    }

    /// Cache a read-through result unless the guild changed since `ticket`.
    pub fn fill_guild_settings(&self, guild_id: i64, settings: GuildSettings, ticket: ReadTicket) -> bool {
        self.changes.apply_if_unchanged((Slot::GuildSettings, guild_id), ticket, || {
            self.guild_settings.insert(guild_id, settings);
            true
        })
    }

    pub fn invalidate_guild_settings(&self, guild_id: i64) -> bool {
        self.changes.record((Slot::GuildSettings, guild_id));
        self.guild_settings.invalidate(&guild_id)
    }

    /// Drop every cached guild. Outstanding read tickets are invalidated.
    pub fn clear_guild_settings(&self) {
        self.changes.reset();
        self.guild_settings.invalidate_all();
    }

    // ========================================================================
    // User profiles
    // ========================================================================

    pub fn user_profile(&self, user_id: i64) -> Option<UserVoiceProfile> {
        self.user_profiles.get(&user_id)
    }

    pub fn set_user_profile(&self, user_id: i64, profile: UserVoiceProfile) {
        self.changes.record((Slot::UserProfile, user_id));
        self.user_profiles.insert(user_id, profile);
    }

    pub fn fill_user_profile(&self, user_id: i64, profile: UserVoiceProfile, ticket: ReadTicket) -> bool {
        self.changes.apply_if_unchanged((Slot::UserProfile, user_id), ticket, || {
            self.user_profiles.insert(user_id, profile);
            true
        })
    }

    pub fn invalidate_user_profile(&self, user_id: i64) -> bool {
        self.changes.record((Slot::UserProfile, user_id));
        self.user_profiles.invalidate(&user_id)
    }

    pub fn clear_user_profiles(&self) {
        self.changes.reset();
        self.user_profiles.invalidate_all();
    }

    // ========================================================================
    // Boost counts
    // ========================================================================

    pub fn boost_count(&self, guild_id: i64) -> Option<i64> {
        self.boost_counts.get(&guild_id)
    }

    /// Store an absolute boost count. Negative values are clamped to zero.
    pub fn set_boost_count(&self, guild_id: i64, count: i64) {
        self.changes.record((Slot::BoostCount, guild_id));
        self.boost_counts.insert(guild_id, count.max(0));
    }

    pub fn fill_boost_count(&self, guild_id: i64, count: i64, ticket: ReadTicket) -> bool {
        self.changes.apply_if_unchanged((Slot::BoostCount, guild_id), ticket, || {
            self.boost_counts.insert(guild_id, count.max(0));
            true
        })
    }

    pub fn invalidate_boost_count(&self, guild_id: i64) -> bool {
        self.changes.record((Slot::BoostCount, guild_id));
        self.boost_counts.invalidate(&guild_id)
    }

    /// Guilds that currently have a cached boost count.
    pub fn boost_guilds(&self) -> Vec<i64> {
        self.boost_counts.keys()
    }

    // ========================================================================
    // Dictionaries
    // ========================================================================

    /// Cached dictionary for `id`.
    ///
    /// The global dictionary ignores TTL and eviction. A dictionary flagged
    /// for reload reads as a miss so the next caller refetches it.
    pub fn dictionary(&self, id: i64) -> Option<Arc<Dictionary>> {
        if self.is_global(id) {
            return self.global_dict.read().clone();
        }
        if self.pending_reload.contains(&id) {
            return None;
        }
        self.dictionaries.get(&id)
    }

    /// Store a dictionary and clear its reload flag.
    pub fn set_dictionary(&self, id: i64, dictionary: Arc<Dictionary>) {
        self.changes.record((Slot::Dictionary, id));
        self.store_dictionary(id, dictionary);
    }

    /// Cache a fetched dictionary and clear its reload flag, unless the
    /// dictionary changed since `ticket` or the guild is no longer active.
    pub fn fill_dictionary(&self, id: i64, dictionary: Arc<Dictionary>, ticket: ReadTicket) -> bool {
        self.changes.apply_if_unchanged((Slot::Dictionary, id), ticket, || {
            if !self.is_active(id) {
                return false;
            }
            self.store_dictionary(id, dictionary);
            true
        })
    }

    fn store_dictionary(&self, id: i64, dictionary: Arc<Dictionary>) {
        let entries = dictionary.len();
        if self.is_global(id) {
            *self.global_dict.write() = Some(dictionary);
        } else {
            self.dictionaries.insert(id, dictionary);
            self.pending_reload.remove(&id);
        }
        debug!("Dictionary set: {} ({} entries)", id, entries);
    }

    /// Note that a dictionary changed in storage without touching the cached
    /// copy. In-flight reads started before this point will not be cached.
    pub fn record_dictionary_change(&self, id: i64) {
        self.changes.record((Slot::Dictionary, id));
    }

    /// Flag an active guild's dictionary as stale.
    ///
    /// Returns `false` (and does nothing) for the global dictionary and for
    /// guilds outside the active set.
    pub fn mark_needs_reload(&self, id: i64) -> bool {
        if self.is_global(id) || !self.active_guilds.contains(&id) {
            return false;
        }
        self.changes.record((Slot::Dictionary, id));
        self.pending_reload.insert(id);
        debug!("Dictionary marked for reload: {}", id);
        true
    }

    pub fn needs_reload(&self, id: i64) -> bool {
        self.pending_reload.contains(&id)
    }

    /// True if the dictionary is cached and not flagged for reload.
    pub fn is_loaded(&self, id: i64) -> bool {
        if self.is_global(id) {
            return self.global_dict.read().is_some();
        }
        self.dictionaries.contains(&id) && !self.pending_reload.contains(&id)
    }

    // ========================================================================
    // Active set
    // ========================================================================

    pub fn mark_active(&self, guild_id: i64) {
        if self.is_global(guild_id) {
            return;
        }
        if self.active_guilds.insert(guild_id) {
            debug!("Guild marked as active: {}", guild_id);
        }
    }

    /// Remove a guild from the active set and drop its dictionary.
    ///
    /// The global dictionary stays active and cached.
    pub fn mark_inactive(&self, guild_id: i64) {
        if self.is_global(guild_id) {
            return;
        }
        self.changes.record((Slot::Dictionary, guild_id));
        self.active_guilds.remove(&guild_id);
        self.dictionaries.invalidate(&guild_id);
        self.pending_reload.remove(&guild_id);
        debug!("Guild marked as inactive: {}", guild_id);
    }

    pub fn is_active(&self, guild_id: i64) -> bool {
        self.is_global(guild_id) || self.active_guilds.contains(&guild_id)
    }

    /// Active guilds, excluding the global dictionary id.
    pub fn active_guilds(&self) -> Vec<i64> {
        self.active_guilds.iter().map(|id| *id).collect()
    }

    // ========================================================================
    // Versioning & stats
    // ========================================================================

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Record a completed resync. Returns the new version.
    pub fn bump_version(&self) -> u64 {
        *self.last_resync_at.write() = Some(Utc::now());
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            guild_settings: self.guild_settings.len(),
            user_profiles: self.user_profiles.len(),
            boost_counts: self.boost_counts.len(),
            dictionaries_loaded: self.dictionaries.len(),
            global_dictionary_loaded: self.global_dict.read().is_some(),
            active_guilds: self.active_guilds.len(),
            pending_dictionary_reloads: self.pending_reload.len(),
            version: self.version(),
            last_resync_at: *self.last_resync_at.read(),
        }
    }
}

impl std::fmt::Debug for DomainCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainCache")
            .field("global_dict_id", &self.global_dict_id)
            .field("stats", &self.stats())
            .finish()
    }
}
