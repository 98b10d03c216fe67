//! Cached entity models.

mod dictionary;
mod guild_settings;
mod user_profile;

pub use dictionary::Dictionary;
pub use guild_settings::{AutoJoinChannels, GuildSettings, MaxChars};
pub use user_profile::UserVoiceProfile;
