//! Change-feed listener: drains a subscription into the dispatcher.

use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::dispatch::ChangeDispatcher;
use super::subscription::Subscription;

/// Connection state of the change feed, observable through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Listening,
    /// Reconnect attempts exhausted. Cached values are still served but no
    /// longer updated.
    Degraded,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Listening => "listening",
            ListenerState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Why [`ChangeFeedListener::listen`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The connection closed or stopped answering health checks.
    Dropped,
    Shutdown,
}

/// Applies every message of a subscription, in arrival order.
#[derive(Clone)]
pub struct ChangeFeedListener {
    dispatcher: ChangeDispatcher,
    health_check_interval: Duration,
}

impl ChangeFeedListener {
    pub fn new(dispatcher: ChangeDispatcher, health_check_interval: Duration) -> Self {
        Self {
            dispatcher,
            health_check_interval,
        }
    }

    /// Process messages until the connection drops or `shutdown` fires.
    ///
    /// Each message is fully applied before the next one is read.
    pub async fn listen(&self, subscription: &mut Subscription, shutdown: &CancellationToken) -> ListenOutcome {
        let mut health = tokio::time::interval_at(
            Instant::now() + self.health_check_interval,
            self.health_check_interval,
        );
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return ListenOutcome::Shutdown,

                message = subscription.recv() => match message {
                    Some(raw) => self.dispatcher.dispatch_raw(&raw).await,
                    None => {
                        warn!("Change feed stream ended");
                        return ListenOutcome::Dropped;
                    }
                },

                _ = health.tick() => {
                    if !subscription.check_health().await {
                        warn!("Change feed health check failed");
                        return ListenOutcome::Dropped;
                    }
                    debug!("Change feed health check passed");
                }
            }
        }
    }
}
