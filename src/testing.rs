//! In-memory test doubles for [`Storage`] and [`ChangeFeed`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::database::{Dictionary, GuildSettings, Storage, UserVoiceProfile};
use crate::error::{FeedError, StorageError, StorageResult};
use crate::events::{ChangeFeed, Subscription, forward};

/// Storage backed by hash maps, with per-kind fetch counters.
#[derive(Default)]
pub struct MemoryStorage {
    guild_settings: Mutex<HashMap<i64, GuildSettings>>,
    user_profiles: Mutex<HashMap<i64, UserVoiceProfile>>,
    dictionaries: Mutex<HashMap<i64, Dictionary>>,
    boosts: Mutex<Vec<(i64, i64)>>,

    guild_settings_fetches: AtomicUsize,
    user_profile_fetches: AtomicUsize,
    boost_fetches: AtomicUsize,
    dictionary_fetches: Mutex<HashMap<i64, usize>>,

    unavailable: AtomicBool,
    failing_dictionaries: Mutex<HashSet<i64>>,
    held_fetches: Mutex<HashMap<(HeldFetch, i64), Arc<FetchGate>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HeldFetch {
    GuildSettings,
    Dictionary,
}

/// Suspends one storage read after it has read its result.
#[derive(Default)]
pub struct FetchGate {
    entered: Notify,
    release: Notify,
}

impl FetchGate {
    /// Wait until the held read has taken its snapshot.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held read return its snapshot.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make dictionary fetches for `owner_id` fail until cleared.
    pub fn fail_dictionary(&self, owner_id: i64, fail: bool) {
        let mut failing = self.failing_dictionaries.lock();
        if fail {
            failing.insert(owner_id);
        } else {
            failing.remove(&owner_id);
        }
    }

    /// Hold the next dictionary fetch for `owner_id` until the gate is released.
    pub fn hold_next_dictionary_fetch(&self, owner_id: i64) -> Arc<FetchGate> {
        self.hold(HeldFetch::Dictionary, owner_id)
    }

    pub fn hold_next_guild_settings_fetch(&self, guild_id: i64) -> Arc<FetchGate> {
        self.hold(HeldFetch::GuildSettings, guild_id)
    }

    fn hold(&self, kind: HeldFetch, id: i64) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate::default());
        self.held_fetches.lock().insert((kind, id), Arc::clone(&gate));
        gate
    }

    async fn wait_if_held(&self, kind: HeldFetch, id: i64) {
        let gate = self.held_fetches.lock().remove(&(kind, id));
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage offline".to_string()));
        }
        Ok(())
    }

    // Seeding, bypassing the counters.

    pub fn put_guild_settings(&self, guild_id: i64, settings: GuildSettings) {
        self.guild_settings.lock().insert(guild_id, settings);
    }

    pub fn put_user_profile(&self, user_id: i64, profile: UserVoiceProfile) {
        self.user_profiles.lock().insert(user_id, profile);
    }

    pub fn put_dictionary(&self, owner_id: i64, dictionary: Dictionary) {
        self.dictionaries.lock().insert(owner_id, dictionary);
    }

    pub fn remove_dictionary(&self, owner_id: i64) {
        self.dictionaries.lock().remove(&owner_id);
    }

    /// Add `count` boosts to `guild_id` from distinct synthetic users.
    pub fn put_boosts(&self, guild_id: i64, count: usize) {
        let mut boosts = self.boosts.lock();
        let base = boosts.len() as i64;
        for n in 0..count as i64 {
            boosts.push((guild_id, 1_000_000 + base + n));
        }
    }

    pub fn clear_boosts(&self, guild_id: i64) {
        self.boosts.lock().retain(|(guild, _)| *guild != guild_id);
    }

    pub fn stored_guild_settings(&self, guild_id: i64) -> Option<GuildSettings> {
        self.guild_settings.lock().get(&guild_id).cloned()
    }

    pub fn stored_dictionary(&self, owner_id: i64) -> Option<Dictionary> {
        self.dictionaries.lock().get(&owner_id).cloned()
    }

    // Counters.

    pub fn guild_settings_fetches(&self) -> usize {
        self.guild_settings_fetches.load(Ordering::SeqCst)
    }

    pub fn user_profile_fetches(&self) -> usize {
        self.user_profile_fetches.load(Ordering::SeqCst)
    }

    pub fn boost_fetches(&self) -> usize {
        self.boost_fetches.load(Ordering::SeqCst)
    }

    pub fn dictionary_fetches_for(&self, owner_id: i64) -> usize {
        self.dictionary_fetches
            .lock()
            .get(&owner_id)
            .copied()
            .unwrap_or(0)
    }

    fn count_for(&self, guild_id: i64) -> i64 {
        self.boosts
            .lock()
            .iter()
            .filter(|(guild, _)| *guild == guild_id)
            .count() as i64
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn fetch_guild_settings(&self, guild_id: i64) -> StorageResult<Option<GuildSettings>> {
        self.check()?;
        self.guild_settings_fetches.fetch_add(1, Ordering::SeqCst);
        let settings = self.stored_guild_settings(guild_id);
        self.wait_if_held(HeldFetch::GuildSettings, guild_id).await;
        Ok(settings)
    }

    async fn store_guild_settings(&self, guild_id: i64, settings: &GuildSettings) -> StorageResult<()> {
        self.check()?;
        self.put_guild_settings(guild_id, settings.clone());
        Ok(())
    }

    async fn fetch_all_guild_settings(&self) -> StorageResult<Vec<(i64, GuildSettings)>> {
        self.check()?;
        Ok(self
            .guild_settings
            .lock()
            .iter()
            .map(|(id, settings)| (*id, settings.clone()))
            .collect())
    }

    async fn fetch_user_profile(&self, user_id: i64) -> StorageResult<Option<UserVoiceProfile>> {
        self.check()?;
        self.user_profile_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.user_profiles.lock().get(&user_id).copied())
    }

    async fn store_user_profile(&self, user_id: i64, profile: &UserVoiceProfile) -> StorageResult<()> {
        self.check()?;
        self.put_user_profile(user_id, *profile);
        Ok(())
    }

    async fn fetch_all_user_profiles(&self) -> StorageResult<Vec<(i64, UserVoiceProfile)>> {
        self.check()?;
        Ok(self
            .user_profiles
            .lock()
            .iter()
            .map(|(id, profile)| (*id, *profile))
            .collect())
    }

    async fn fetch_dictionary(&self, owner_id: i64) -> StorageResult<Option<Dictionary>> {
        self.check()?;
        if self.failing_dictionaries.lock().contains(&owner_id) {
            return Err(StorageError::Unavailable(format!("dictionary {owner_id} unavailable")));
        }
        *self.dictionary_fetches.lock().entry(owner_id).or_default() += 1;
        let dictionary = self.stored_dictionary(owner_id);
        self.wait_if_held(HeldFetch::Dictionary, owner_id).await;
        Ok(dictionary)
    }

    async fn store_dictionary(&self, owner_id: i64, dictionary: &Dictionary) -> StorageResult<()> {
        self.check()?;
        self.put_dictionary(owner_id, dictionary.clone());
        Ok(())
    }

    async fn fetch_boost_count(&self, guild_id: i64) -> StorageResult<i64> {
        self.check()?;
        self.boost_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.count_for(guild_id))
    }

    async fn fetch_boost_counts(&self) -> StorageResult<HashMap<i64, i64>> {
        self.check()?;
        let mut counts = HashMap::new();
        for (guild_id, _) in self.boosts.lock().iter() {
            *counts.entry(*guild_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn grant_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<i64> {
        self.check()?;
        self.boosts.lock().push((guild_id, user_id));
        Ok(self.count_for(guild_id))
    }

    async fn revoke_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<Option<i64>> {
        self.check()?;
        let removed = {
            let mut boosts = self.boosts.lock();
            match boosts.iter().position(|row| *row == (guild_id, user_id)) {
                Some(index) => {
                    boosts.remove(index);
                    true
                }
                None => false,
            }
        };
        Ok(removed.then(|| self.count_for(guild_id)))
    }
}

/// Change feed driven by the test.
///
/// Each successful `subscribe` opens a fresh connection; [`MemoryFeed::publish`]
/// writes to the current one and [`MemoryFeed::drop_connection`] severs it.
pub struct MemoryFeed {
    state: Mutex<FeedState>,
    buffer: usize,
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::with_buffer(16)
    }
}

#[derive(Default)]
struct FeedState {
    current: Option<mpsc::UnboundedSender<String>>,
    failures_remaining: usize,
    offline: bool,
    subscribes: usize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed whose subscriptions queue at most `buffer` undelivered messages.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: Mutex::new(FeedState::default()),
            buffer: buffer.max(1),
        }
    }

    /// Deliver a message on the live connection. Returns `false` if none.
    pub fn publish(&self, message: impl Into<String>) -> bool {
        match &self.state.lock().current {
            Some(tx) => tx.send(message.into()).is_ok(),
            None => false,
        }
    }

    pub fn drop_connection(&self) {
        self.state.lock().current = None;
    }

    /// Fail the next `n` subscribe attempts.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures_remaining = n;
    }

    /// Refuse every subscribe attempt while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().subscribes
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        let mut state = self.state.lock();
        state.subscribes += 1;

        if state.offline {
            return Err(FeedError::Unavailable("memory feed offline".to_string()));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(FeedError::Unavailable("memory feed refused".to_string()));
        }

        let (source_tx, mut source_rx) = mpsc::unbounded_channel::<String>();
        let (tx, rx) = mpsc::channel(self.buffer);
        let driver = tokio::spawn(async move {
            while let Some(message) = source_rx.recv().await {
                if !forward(&tx, message) {
                    break;
                }
            }
        });

        state.current = Some(source_tx);
        Ok(Subscription::new(rx, driver))
    }
}

/// Let spawned tasks drain their queues. Under a paused clock this also
/// auto-advances past any pending short timers.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}
