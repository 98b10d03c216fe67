//! Bounded cache with TTL expiry and LRU eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::CacheConfig;

/// A single cached value with its bookkeeping.
///
/// Entries are replaced whole on write. The access stamps are atomics so
/// that a hit can refresh them while only holding the read lock.
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    /// Nanoseconds since the owning cache's epoch.
    last_accessed_at: AtomicU64,
    /// Orders accesses that land on the same clock reading.
    access_seq: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn recency(&self) -> (u64, u64) {
        (
            self.last_accessed_at.load(Ordering::Relaxed),
            self.access_seq.load(Ordering::Relaxed),
        )
    }
}

struct Inner<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    capacity: usize,
    ttl: Option<Duration>,
    epoch: Instant,
    seq: AtomicU64,
}

impl<K, V> Inner<K, V> {
    fn stamp(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.epoch).as_nanos()).unwrap_or(u64::MAX)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.created_at) > ttl)
    }
}

/// A keyed cache holding at most `capacity` entries.
///
/// - Entries older than the TTL read as absent and are dropped on the next eviction pass
/// - When over capacity, expired entries go first, then the least recently accessed ones
/// - Clone-friendly (cloning is cheap, shares the same underlying storage)
pub struct BoundedCache<K, V> {
    inner: Arc<Inner<K, V>>,
    name: Arc<str>,
}

// Manual Clone implementation that doesn't require K: Clone, V: Clone
impl<K, V> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: Arc::clone(&self.name),
        }
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache with the given name and config.
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                capacity: config.max_capacity,
                ttl: config.ttl,
                epoch: Instant::now(),
                seq: AtomicU64::new(0),
            }),
            name: name.into(),
        }
    }

    /// Get a value from the cache.
    ///
    /// Returns `Some(value)` if the key exists and hasn't expired, refreshing
    /// its last-access time.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.inner.entries.read();
        let entry = entries.get(key)?;

        if self.inner.is_expired(entry, now) {
            return None;
        }

        entry
            .last_accessed_at
            .store(self.inner.stamp(now), Ordering::Relaxed);
        entry
            .access_seq
            .store(self.inner.next_seq(), Ordering::Relaxed);

        Some(entry.value.clone())
    }

    /// Check if a live entry exists without touching its access time.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .read()
            .get(key)
            .is_some_and(|entry| !self.inner.is_expired(entry, now))
    }

    /// Insert or replace a value, then evict if over capacity.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let stamp = self.inner.stamp(now);
        let entry = CacheEntry {
            value,
            created_at: now,
            last_accessed_at: AtomicU64::new(stamp),
            access_seq: AtomicU64::new(self.inner.next_seq()),
        };

        let mut entries = self.inner.entries.write();
        entries.insert(key, entry);
        self.evict_if_needed(&mut entries, now);
    }

    /// Remove a key from the cache.
    ///
    /// Returns `true` if the key was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.entries.write().remove(key).is_some()
    }

    /// Remove all entries from the cache.
    pub fn invalidate_all(&self) {
        let mut entries = self.inner.entries.write();
        let removed = entries.len();
        entries.clear();
        debug!("Cleared {} entries from '{}'", removed, self.name);
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Keys of all live (non-expired) entries.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        self.inner
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !self.inner.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn evict_if_needed(&self, entries: &mut HashMap<K, CacheEntry<V>>, now: Instant) {
        let capacity = self.inner.capacity;
        if entries.len() <= capacity {
            return;
        }

        let before = entries.len();
        if self.inner.ttl.is_some() {
            entries.retain(|_, entry| !self.inner.is_expired(entry, now));
        }
        let expired = before - entries.len();

        let mut evicted = 0;
        if entries.len() > capacity {
            let excess = entries.len() - capacity;
            let mut by_recency: Vec<(K, (u64, u64))> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.recency()))
                .collect();
            by_recency.sort_unstable_by_key(|(_, recency)| *recency);

            for (key, _) in by_recency.into_iter().take(excess) {
                entries.remove(&key);
                evicted += 1;
            }
        }

        debug!(
            "Cache '{}' over capacity: dropped {} expired, evicted {} LRU entries",
            self.name, expired, evicted
        );
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("entry_count", &self.inner.entries.read().len())
            .field("capacity", &self.inner.capacity)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}
