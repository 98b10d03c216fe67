//! Repository module - per-entity data access with caching.

mod boost_repository;
mod dictionary_repository;
mod guild_settings_repository;
mod user_profile_repository;

pub use boost_repository::BoostRepository;
pub use dictionary_repository::DictionaryRepository;
pub use guild_settings_repository::GuildSettingsRepository;
pub use user_profile_repository::UserProfileRepository;
