//! Per-key change stamps guarding read-through fills.
//!
//! A reader takes a [`ReadTicket`] before going to storage. Every change to a
//! key stamps it with a fresh sequence number. When the read completes, its
//! result may only be cached if the key has not been stamped since the ticket
//! was taken.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Position in the change sequence observed before a storage read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadTicket(u64);

pub(crate) struct ChangeLog<K> {
    clock: AtomicU64,
    /// Tickets older than this are rejected outright. Raised whenever the
    /// stamps are discarded.
    floor: AtomicU64,
    stamps: DashMap<K, u64>,
    max_entries: usize,
}

impl<K> ChangeLog<K>
where
    K: Hash + Eq,
{
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            clock: AtomicU64::new(0),
            floor: AtomicU64::new(0),
            stamps: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub(crate) fn ticket(&self) -> ReadTicket {
        ReadTicket(self.clock.load(Ordering::SeqCst))
    }

    /// Stamp `key` as changed. Must happen before the change is applied to
    /// the cache.
    pub(crate) fn record(&self, key: K) {
        if self.stamps.len() >= self.max_entries {
            self.reset();
        }
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.stamps.insert(key, stamp);
    }

    /// Invalidate every outstanding ticket.
    pub(crate) fn reset(&self) {
        let now = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.floor.store(now, Ordering::SeqCst);
        self.stamps.clear();
        debug!("Change log reset at sequence {}", now);
    }

    /// Run `apply` if `key` is unchanged since `ticket`, holding the key's
    /// shard lock so no change can be recorded in between.
    ///
    /// Returns `false` without calling `apply` if the key changed, otherwise
    /// whatever `apply` returns.
    pub(crate) fn apply_if_unchanged(&self, key: K, ticket: ReadTicket, apply: impl FnOnce() -> bool) -> bool {
        let entry = self.stamps.entry(key);
        let changed = match &entry {
            Entry::Occupied(stamp) => *stamp.get() > ticket.0,
            Entry::Vacant(_) => false,
        };
        if changed || ticket.0 < self.floor.load(Ordering::SeqCst) {
            return false;
        }
        let applied = apply();
        drop(entry);
        applied
    }
}
