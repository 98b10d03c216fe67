//! Change-feed handling.
//!
//! ```text
//! ChangeFeed ──► Subscription ──► ChangeFeedListener ──► ChangeDispatcher ──► DomainCache
//!                     ▲                                                           ▲
//!          ReconnectSupervisor ─────────────► Resynchronizer ─────────────────────┘
//! ```
//!
//! Messages from one connection are applied in order by a single consumer.
//! Nothing is assumed about ordering across reconnects, so every reconnect
//! is followed by an unconditional resync. A consumer that falls behind far
//! enough to fill the queue is treated the same way as a dropped connection.

mod change;
mod dispatch;
mod listener;
mod resync;
mod subscription;
mod supervisor;

pub use change::{ChangeEvent, EntityKind, Operation};
pub use dispatch::ChangeDispatcher;
pub use listener::{ChangeFeedListener, ListenOutcome, ListenerState};
pub use resync::{ResyncReport, Resynchronizer};
pub use subscription::{ChangeFeed, PgChangeFeed, Subscription};
pub use supervisor::{FeedConfig, ReconnectSupervisor};

#[cfg(test)]
pub(crate) use subscription::forward;
