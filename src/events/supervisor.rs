//! Keeps the change feed connected and the cache consistent across drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::listener::{ChangeFeedListener, ListenOutcome, ListenerState};
use super::resync::Resynchronizer;
use super::subscription::{ChangeFeed, Subscription};

/// Change feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Notification channel name
    pub channel: String,
    pub health_check_interval: Duration,
    /// Subscribe attempts per reconnect before giving up
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Queue depth between the connection and the consumer
    pub buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel: "settings_change".to_string(),
            health_check_interval: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            buffer: 256,
        }
    }
}

enum Connect {
    Connected(Subscription),
    Exhausted,
    Shutdown,
}

/// Drives the listener state machine.
///
/// Connects, listens until the feed drops, then reconnects with a bounded
/// number of attempts. Every successful reconnect is followed by a resync
/// pass before listening resumes. When attempts run out the supervisor
/// stops in [`ListenerState::Degraded`].
pub struct ReconnectSupervisor {
    feed: Arc<dyn ChangeFeed>,
    listener: ChangeFeedListener,
    resync: Resynchronizer,
    config: FeedConfig,
    state: watch::Sender<ListenerState>,
}

impl ReconnectSupervisor {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        listener: ChangeFeedListener,
        resync: Resynchronizer,
        config: FeedConfig,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            feed,
            listener,
            resync,
            config,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }

    /// Run until `shutdown` fires or the feed degrades.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut reconnecting = false;

        loop {
            self.set_state(ListenerState::Connecting);

            let mut subscription = match self.connect(&shutdown).await {
                Connect::Connected(subscription) => subscription,
                Connect::Shutdown => break,
                Connect::Exhausted => {
                    self.set_state(ListenerState::Degraded);
                    error!(
                        "Change feed degraded after {} failed attempts; cache will serve last known values without live updates",
                        self.config.max_reconnect_attempts
                    );
                    return;
                }
            };

            if reconnecting {
                info!("Change feed reconnected, resynchronizing cache");
                self.resync.run().await;
            }
            reconnecting = true;

            self.set_state(ListenerState::Listening);
            let outcome = self.listener.listen(&mut subscription, &shutdown).await;
            subscription.close();

            match outcome {
                ListenOutcome::Shutdown => break,
                ListenOutcome::Dropped => {
                    warn!("Change feed connection lost, reconnecting");
                    self.set_state(ListenerState::Disconnected);
                }
            }
        }

        self.set_state(ListenerState::Disconnected);
        info!("Change feed supervisor stopped");
    }

    async fn connect(&self, shutdown: &CancellationToken) -> Connect {
        let attempts = self.config.max_reconnect_attempts.max(1);

        for attempt in 1..=attempts {
            let result = tokio::select! {
                _ = shutdown.cancelled() => return Connect::Shutdown,
                result = self.feed.subscribe() => result,
            };

            match result {
                Ok(subscription) => return Connect::Connected(subscription),
                Err(e) => warn!(
                    "Change feed connect attempt {}/{} failed: {}",
                    attempt, attempts, e
                ),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = shutdown.cancelled() => return Connect::Shutdown,
                    _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                }
            }
        }

        Connect::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DomainCache, DomainCacheConfig};
    use crate::database::Dictionary;
    use crate::events::ChangeDispatcher;
    use crate::testing::{settle, MemoryFeed, MemoryStorage};
    use tokio::task::JoinHandle;

    const GLOBAL: i64 = 0;

    struct Harness {
        storage: Arc<MemoryStorage>,
        cache: Arc<DomainCache>,
        feed: Arc<MemoryFeed>,
        state: watch::Receiver<ListenerState>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start(feed: MemoryFeed, max_reconnect_attempts: u32) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(DomainCache::new(GLOBAL, DomainCacheConfig::default()));
        let feed = Arc::new(feed);
        let config = FeedConfig {
            max_reconnect_attempts,
            ..Default::default()
        };

        let dispatcher = ChangeDispatcher::new(cache.clone(), storage.clone());
        let supervisor = ReconnectSupervisor::new(
            feed.clone(),
            ChangeFeedListener::new(dispatcher, config.health_check_interval),
            Resynchronizer::new(cache.clone(), storage.clone()),
            config,
        );
        let state = supervisor.state();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(shutdown.clone()));

        Harness {
            storage,
            cache,
            feed,
            state,
            shutdown,
            task,
        }
    }

    fn dict(reading: &str) -> Dictionary {
        [("word", reading)].into_iter().collect()
    }

    async fn wait_for(state: &mut watch::Receiver<ListenerState>, target: ListenerState) {
        state.wait_for(|s| *s == target).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_while_listening() {
        let mut h = start(MemoryFeed::new(), 3);
        wait_for(&mut h.state, ListenerState::Listening).await;

        assert!(h.feed.publish(r#"{"table":"guild_boosts","operation":"INSERT","id":1,"data":{"count":4}}"#));
        settle().await;

        assert_eq!(h.cache.boost_count(1), Some(4));
        assert_eq!(h.cache.version(), 0);

        h.shutdown.cancel();
        h.task.await.unwrap();
        assert_eq!(*h.state.borrow(), ListenerState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_after_reconnect_overwrites_stale_values() {
        let mut h = start(MemoryFeed::new(), 3);
        wait_for(&mut h.state, ListenerState::Listening).await;

        for guild in [1, 2] {
            h.cache.mark_active(guild);
            h.cache.set_dictionary(guild, Arc::new(dict("before")));
        }
        h.cache.set_boost_count(1, 9);

        // Writes land during the outage; no events are delivered for them.
        h.feed.drop_connection();
        h.feed.fail_next(1);
        for guild in [1, 2] {
            h.storage.put_dictionary(guild, dict("after"));
        }
        h.storage.put_boosts(1, 2);

        wait_for(&mut h.state, ListenerState::Connecting).await;
        wait_for(&mut h.state, ListenerState::Listening).await;

        for guild in [1, 2] {
            assert_eq!(*h.cache.dictionary(guild).unwrap(), dict("after"));
            assert_eq!(h.storage.dictionary_fetches_for(guild), 1);
        }
        assert_eq!(h.cache.boost_count(1), Some(2));
        assert_eq!(h.cache.version(), 1);
        assert_eq!(h.feed.subscribe_count(), 3);
        assert!(h.feed.is_connected());

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_overflow_forces_resync() {
        let mut h = start(MemoryFeed::with_buffer(2), 3);
        wait_for(&mut h.state, ListenerState::Listening).await;
        h.storage.put_boosts(1, 3);

        for count in 0..10 {
            h.feed.publish(format!(
                r#"{{"table":"guild_boosts","operation":"INSERT","id":1,"data":{{"count":{count}}}}}"#
            ));
        }
        h.feed.fail_next(1);

        wait_for(&mut h.state, ListenerState::Connecting).await;
        wait_for(&mut h.state, ListenerState::Listening).await;

        // Only what fit in the queue was applied; the resync filled the gap.
        assert_eq!(h.cache.boost_count(1), Some(3));
        assert_eq!(h.cache.version(), 1);
        assert_eq!(h.feed.subscribe_count(), 3);

        h.shutdown.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_degrades_after_retry_cap() {
        let feed = MemoryFeed::new();
        feed.set_offline(true);
        let mut h = start(feed, 3);

        wait_for(&mut h.state, ListenerState::Degraded).await;
        h.task.await.unwrap();

        assert_eq!(h.feed.subscribe_count(), 3);
        assert_eq!(*h.state.borrow(), ListenerState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_cache_keeps_serving() {
        let mut h = start(MemoryFeed::new(), 2);
        wait_for(&mut h.state, ListenerState::Listening).await;
        h.cache.set_boost_count(5, 1);

        h.feed.set_offline(true);
        h.feed.drop_connection();
        wait_for(&mut h.state, ListenerState::Degraded).await;

        assert_eq!(h.cache.boost_count(5), Some(1));
        assert_eq!(h.cache.version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_retry_delay() {
        let feed = MemoryFeed::new();
        feed.set_offline(true);
        let h = start(feed, 100);
        settle().await;

        h.shutdown.cancel();
        h.task.await.unwrap();

        assert!(h.feed.subscribe_count() < 100);
        assert_eq!(*h.state.borrow(), ListenerState::Disconnected);
    }
}
