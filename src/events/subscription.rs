//! Change-feed subscriptions.
//!
//! A [`ChangeFeed`] opens a [`Subscription`]: a bounded queue of raw
//! notification payloads filled by a driver task that owns the connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, info, warn};

use crate::error::FeedError;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a new connection and start listening.
    async fn subscribe(&self) -> Result<Subscription, FeedError>;
}

/// A live listening connection.
///
/// Dropping it aborts the driver, which closes the connection.
pub struct Subscription {
    messages: mpsc::Receiver<String>,
    driver: JoinHandle<()>,
    client: Option<Client>,
}

impl Subscription {
    pub fn new(messages: mpsc::Receiver<String>, driver: JoinHandle<()>) -> Self {
        Self {
            messages,
            driver,
            client: None,
        }
    }

    /// Attach the client used for health pings. Keeping it also keeps the
    /// connection open.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Next payload, or `None` once the connection is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_finished()
    }

    /// Whether the connection still answers.
    pub async fn check_health(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(client) = &self.client else {
            return true;
        };
        if client.is_closed() {
            return false;
        }
        match tokio::time::timeout(PING_TIMEOUT, client.simple_query("SELECT 1")).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!("Change feed ping failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Change feed ping timed out after {:?}", PING_TIMEOUT);
                false
            }
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

/// Hand a payload to the consumer without waiting for queue space.
///
/// A full queue means the consumer has fallen behind and notifications are
/// about to be lost. Returns `false` in that case, and when the consumer is
/// gone, so the driver ends the subscription and the supervisor reconnects
/// and resynchronizes.
pub(crate) fn forward(tx: &mpsc::Sender<String>, payload: String) -> bool {
    match tx.try_send(payload) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(
                "Change feed queue full ({} pending), dropping connection to force a resync",
                tx.max_capacity()
            );
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .field("queued", &self.messages.len())
            .finish()
    }
}

/// `LISTEN`-based feed on a dedicated PostgreSQL connection.
pub struct PgChangeFeed {
    config: tokio_postgres::Config,
    channel: String,
    buffer: usize,
}

impl PgChangeFeed {
    pub fn new(config: tokio_postgres::Config, channel: impl Into<String>, buffer: usize) -> Self {
        Self {
            config,
            channel: channel.into(),
            buffer: buffer.max(1),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        let (client, mut connection) = self.config.connect(NoTls).await?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let channel = self.channel.clone();

        let driver = tokio::spawn(async move {
            let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        if notification.channel() != channel {
                            continue;
                        }
                        if !forward(&tx, notification.payload().to_string()) {
                            break;
                        }
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        debug!("Change feed notice: {}", notice.message());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Change feed connection error: {}", e);
                        break;
                    }
                }
            }
            debug!("Change feed driver stopped");
        });

        let subscription = Subscription::new(rx, driver);
        client
            .batch_execute(&format!("LISTEN {}", quote_ident(&self.channel)))
            .await?;
        info!("Listening for changes on channel '{}'", self.channel);

        Ok(subscription.with_client(client))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("settings_change"), "\"settings_change\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_subscription_drains_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let driver = tokio::spawn(async move {
            tx.send("one".to_string()).await.ok();
        });
        let mut subscription = Subscription::new(rx, driver);

        assert_eq!(subscription.recv().await.as_deref(), Some("one"));
        assert_eq!(subscription.recv().await, None);
        assert!(subscription.is_closed());
        assert!(!subscription.check_health().await);
    }

    #[tokio::test]
    async fn test_forward_refuses_when_full() {
        let (tx, mut rx) = mpsc::channel(2);

        assert!(forward(&tx, "one".to_string()));
        assert!(forward(&tx, "two".to_string()));
        assert!(!forward(&tx, "three".to_string()));

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        drop(rx);
        assert!(!forward(&tx, "four".to_string()));
    }

    #[tokio::test]
    async fn test_drop_aborts_driver() {
        let (_tx, rx) = mpsc::channel::<String>(1);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let driver = tokio::spawn(async move {
            let _guard = done_tx;
            std::future::pending::<()>().await;
        });

        Subscription::new(rx, driver).close();

        assert!(done_rx.await.is_err());
    }
}
