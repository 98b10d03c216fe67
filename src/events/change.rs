//! Change-feed messages decoded into typed events.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;

/// Cached entity a change refers to, keyed by source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    GuildSettings,
    UserProfile,
    Dictionary,
    BoostCount,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::GuildSettings,
        EntityKind::UserProfile,
        EntityKind::Dictionary,
        EntityKind::BoostCount,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::GuildSettings => "guild_settings",
            EntityKind::UserProfile => "user_settings",
            EntityKind::Dictionary => "dict",
            EntityKind::BoostCount => "guild_boosts",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// One row-level change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub operation: Operation,
    pub id: i64,
    /// `None` when the message carried no data (or JSON `null`).
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawChange {
    table: String,
    operation: Operation,
    id: i64,
    #[serde(default)]
    data: Option<Value>,
}

impl ChangeEvent {
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let change: RawChange = serde_json::from_str(raw)?;
        let kind = EntityKind::from_table(&change.table)
            .ok_or(DecodeError::UnknownTable(change.table))?;

        Ok(Self {
            kind,
            operation: change.operation,
            id: change.id,
            payload: change.data,
        })
    }

    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }
}
