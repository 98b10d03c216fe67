//! Database module exports.

mod models;
mod postgres;
mod repository;
pub mod schema;
mod storage;

pub use models::*;
pub use postgres::{Database, DbConfig};
pub use repository::{
    BoostRepository, DictionaryRepository, GuildSettingsRepository, UserProfileRepository,
};
pub use storage::Storage;
