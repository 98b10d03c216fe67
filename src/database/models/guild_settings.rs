//! Per-guild reading settings.
//!
//! Stored as a single JSONB document per guild and always replaced whole.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Character limit for a single read-aloud message, constrained to `[10, 500]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct MaxChars(u16);

impl MaxChars {
    pub const MIN: u16 = 10;
    pub const MAX: u16 = 500;
    pub const DEFAULT: MaxChars = MaxChars(50);

    pub fn new(value: i64) -> Result<Self, ModelError> {
        match u16::try_from(value) {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Ok(Self(v)),
            _ => Err(ModelError::MaxCharsOutOfRange {
                value,
                min: Self::MIN,
                max: Self::MAX,
            }),
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl Default for MaxChars {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for MaxChars {
    type Error = ModelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxChars> for u16 {
    fn from(value: MaxChars) -> Self {
        value.0
    }
}

/// Channels a reader bot joins automatically.
///
/// Either side may be unset while a guild is still configuring auto-join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoJoinChannels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<i64>,
}

/// Guild reading settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    /// Join voice channels automatically
    pub auto_join: bool,

    /// Reader bot id -> channels it joins
    pub auto_join_config: HashMap<String, AutoJoinChannels>,

    pub max_chars: MaxChars,

    /// Announce members joining/leaving voice
    pub read_vc_status: bool,

    /// Read mentions as display names
    pub read_mention: bool,

    pub read_emoji: bool,

    /// Append an honorific after user names
    pub add_suffix: bool,

    pub read_romaji: bool,

    /// Mention that a message has attachments
    pub read_attachments: bool,

    pub skip_code_blocks: bool,

    pub skip_urls: bool,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            auto_join: false,
            auto_join_config: HashMap::new(),
            max_chars: MaxChars::DEFAULT,
            read_vc_status: false,
            read_mention: true,
            read_emoji: true,
            add_suffix: false,
            read_romaji: false,
            read_attachments: true,
            skip_code_blocks: true,
            skip_urls: true,
        }
    }
}

impl GuildSettings {
    /// Channels configured for the given reader bot, if any.
    pub fn auto_join_for(&self, bot_id: i64) -> Option<AutoJoinChannels> {
        self.auto_join_config.get(&bot_id.to_string()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings: GuildSettings = serde_json::from_value(json!({ "auto_join": true })).unwrap();

        assert!(settings.auto_join);
        assert_eq!(settings.max_chars.get(), 50);
        assert!(settings.read_mention);
        assert!(settings.skip_urls);
        assert!(settings.auto_join_config.is_empty());
    }

    #[test]
    fn test_max_chars_bounds_are_enforced_on_decode() {
        assert!(serde_json::from_value::<GuildSettings>(json!({ "max_chars": 9 })).is_err());
        assert!(serde_json::from_value::<GuildSettings>(json!({ "max_chars": 501 })).is_err());
        assert!(serde_json::from_value::<GuildSettings>(json!({ "max_chars": -3 })).is_err());

        let settings: GuildSettings = serde_json::from_value(json!({ "max_chars": 500 })).unwrap();
        assert_eq!(settings.max_chars.get(), 500);
    }

    #[test]
    fn test_max_chars_new() {
        assert_eq!(MaxChars::new(10).map(MaxChars::get), Ok(10));
        assert_eq!(
            MaxChars::new(7),
            Err(ModelError::MaxCharsOutOfRange { value: 7, min: 10, max: 500 })
        );
    }

    #[test]
    fn test_auto_join_config_shape() {
        let settings: GuildSettings = serde_json::from_value(json!({
            "auto_join_config": { "42": { "voice": 100, "text": 200 } }
        }))
        .unwrap();

        assert_eq!(
            settings.auto_join_for(42),
            Some(AutoJoinChannels {
                voice: Some(100),
                text: Some(200),
            })
        );
        assert_eq!(settings.auto_join_for(7), None);
    }

    #[test]
    fn test_partial_auto_join_entry_keeps_other_settings() {
        let settings: GuildSettings = serde_json::from_value(json!({
            "auto_join": true,
            "max_chars": 200,
            "auto_join_config": { "42": { "voice": 5 }, "43": {} }
        }))
        .unwrap();

        assert!(settings.auto_join);
        assert_eq!(settings.max_chars.get(), 200);
        assert_eq!(
            settings.auto_join_for(42),
            Some(AutoJoinChannels {
                voice: Some(5),
                text: None,
            })
        );
        assert_eq!(settings.auto_join_for(43), Some(AutoJoinChannels::default()));
    }

    #[test]
    fn test_unset_channel_is_omitted_on_write() {
        let mut settings = GuildSettings::default();
        settings.auto_join_config.insert(
            "42".to_string(),
            AutoJoinChannels {
                voice: Some(5),
                text: None,
            },
        );

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["auto_join_config"], json!({ "42": { "voice": 5 } }));
    }

    #[test]
    fn test_serializes_max_chars_as_number() {
        let value = serde_json::to_value(GuildSettings::default()).unwrap();
        assert_eq!(value["max_chars"], json!(50));
    }
}
