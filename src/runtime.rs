//! Sync runtime - wires storage, cache, gateway and the change-feed supervisor.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::DomainCache;
use crate::config::Config;
use crate::database::{Database, Storage};
use crate::events::{
    ChangeDispatcher, ChangeFeed, ChangeFeedListener, ListenerState, PgChangeFeed,
    ReconnectSupervisor, Resynchronizer,
};
use crate::gateway::PersistenceGateway;

/// A running cache with its change-feed supervisor.
pub struct SyncRuntime {
    gateway: PersistenceGateway,
    state: watch::Receiver<ListenerState>,
    shutdown: CancellationToken,
    supervisor: JoinHandle<()>,
}

impl SyncRuntime {
    /// Connect to PostgreSQL, install the schema and start syncing.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL...");
        let database = Database::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?;
        database
            .init_schema(&config.feed.channel)
            .await
            .context("failed to initialize database schema")?;

        let feed = PgChangeFeed::new(
            config
                .database
                .pg_config()
                .context("invalid change feed connection settings")?,
            config.feed.channel.clone(),
            config.feed.buffer,
        );

        Self::with_parts(config, Arc::new(database), Arc::new(feed)).await
    }

    /// Start on top of an existing storage and feed.
    ///
    /// The feed is subscribed before the warm-up reads, so any change
    /// committed while warming up is delivered and wins over the bulk read.
    pub async fn with_parts(
        config: &Config,
        storage: Arc<dyn Storage>,
        feed: Arc<dyn ChangeFeed>,
    ) -> anyhow::Result<Self> {
        let cache = Arc::new(DomainCache::new(config.global_dict_id, config.cache));
        let gateway = PersistenceGateway::new(Arc::clone(&storage), Arc::clone(&cache), config.boost_policy);

        let dispatcher = ChangeDispatcher::new(Arc::clone(&cache), Arc::clone(&storage));
        let supervisor = ReconnectSupervisor::new(
            feed,
            ChangeFeedListener::new(dispatcher, config.feed.health_check_interval),
            Resynchronizer::new(cache, storage),
            config.feed.clone(),
        );
        let mut state = supervisor.state();
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(supervisor.run(shutdown.clone()));

        let subscribed = state
            .wait_for(|s| matches!(s, ListenerState::Listening | ListenerState::Degraded))
            .await
            .map(|s| *s);
        match subscribed {
            Ok(ListenerState::Listening) => {}
            Ok(_) => warn!("Starting without live updates: change feed unavailable"),
            Err(_) => warn!("Change feed supervisor exited during startup"),
        }

        if config.warm_up {
            if let Err(e) = gateway.warm_up().await {
                warn!("Cache warm-up failed, continuing with a cold cache: {}", e);
            }
        }

        info!("Sync runtime started (channel '{}')", config.feed.channel);
        Ok(Self {
            gateway,
            state,
            shutdown,
            supervisor,
        })
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Change-feed state updates.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Stop the supervisor and wait for it to close its subscription.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        info!("Shutting down sync runtime...");
        self.shutdown.cancel();
        self.supervisor
            .await
            .context("change feed supervisor panicked")?;

        let stats = self.gateway.cache().stats();
        info!(
            "Sync runtime stopped (cache version {}, {} active guilds)",
            stats.version, stats.active_guilds
        );
        Ok(())
    }
}
