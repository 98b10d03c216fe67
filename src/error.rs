//! Error types.
//!
//! Only storage connectivity problems surface to callers of the gateway.
//! Absence and staleness are never errors.

use thiserror::Error;

/// Failure talking to the backing store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error("failed to acquire database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure establishing a change-feed subscription.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid change feed configuration: {0}")]
    Config(#[from] deadpool_postgres::ConfigError),

    #[error("change feed connection failed: {0}")]
    Connect(#[from] tokio_postgres::Error),

    #[error("change feed unavailable: {0}")]
    Unavailable(String),
}

/// A change-feed message that could not be turned into a [`ChangeEvent`](crate::events::ChangeEvent).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed change message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

/// A model value outside its allowed domain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("max_chars must be between {min} and {max}, got {value}")]
    MaxCharsOutOfRange { value: i64, min: u16, max: u16 },
}
