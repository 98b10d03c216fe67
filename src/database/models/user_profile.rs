//! Per-user voice profile.

use serde::{Deserialize, Serialize};

/// Voice, speed and pitch a user is read with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserVoiceProfile {
    /// Synthesis speaker id (`speaker` column).
    #[serde(rename = "speaker", alias = "voice")]
    pub voice: i32,
    pub speed: f32,
    pub pitch: f32,
}

impl Default for UserVoiceProfile {
    fn default() -> Self {
        Self {
            voice: 1,
            speed: 1.0,
            pitch: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_trigger_payload() {
        let profile: UserVoiceProfile =
            serde_json::from_value(json!({ "speaker": 3, "speed": 1.5, "pitch": -0.25 })).unwrap();

        assert_eq!(profile, UserVoiceProfile { voice: 3, speed: 1.5, pitch: -0.25 });
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let profile: UserVoiceProfile = serde_json::from_value(json!({ "voice": 8 })).unwrap();

        assert_eq!(profile.voice, 8);
        assert_eq!(profile.speed, 1.0);
        assert_eq!(profile.pitch, 0.0);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(serde_json::from_value::<UserVoiceProfile>(json!({ "speaker": "x" })).is_err());
    }
}
