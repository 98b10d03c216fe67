//! Full cache resynchronization after a change-feed gap.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::DomainCache;
use crate::database::{BoostRepository, DictionaryRepository, Storage};

/// Outcome of one resync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub version: u64,
    pub dictionaries_refreshed: usize,
    pub boost_counts_refreshed: usize,
    pub failures: usize,
}

/// Overwrites everything the cache may have missed while disconnected.
#[derive(Clone)]
pub struct Resynchronizer {
    cache: Arc<DomainCache>,
    dictionaries: DictionaryRepository,
    boosts: BoostRepository,
}

impl Resynchronizer {
    pub fn new(cache: Arc<DomainCache>, storage: Arc<dyn Storage>) -> Self {
        Self {
            dictionaries: DictionaryRepository::new(Arc::clone(&storage), Arc::clone(&cache)),
            boosts: BoostRepository::new(storage, Arc::clone(&cache)),
            cache,
        }
    }

    /// Refetch the global dictionary, every active guild's dictionary and all
    /// boost counts, then drop cached settings and profiles.
    ///
    /// Per-item failures keep the previous value and do not stop the pass.
    pub async fn run(&self) -> ResyncReport {
        let mut report = ResyncReport::default();

        let mut owners = vec![self.cache.global_dict_id()];
        owners.extend(self.cache.active_guilds());

        for owner_id in owners {
            match self.dictionaries.refresh(owner_id).await {
                Ok(_) => report.dictionaries_refreshed += 1,
                Err(e) => {
                    warn!("Resync: failed to refresh dictionary {}: {}", owner_id, e);
                    report.failures += 1;
                }
            }
        }

        match self.boosts.refresh_all().await {
            Ok(count) => report.boost_counts_refreshed = count,
            Err(e) => {
                warn!("Resync: failed to refresh boost counts: {}", e);
                report.failures += 1;
            }
        }

        self.cache.clear_guild_settings();
        self.cache.clear_user_profiles();

        report.version = self.cache.bump_version();
        info!(
            "Cache resynchronized (version {}): {} dictionaries, {} boost counts, {} failures",
            report.version, report.dictionaries_refreshed, report.boost_counts_refreshed, report.failures
        );
        report
    }
}
