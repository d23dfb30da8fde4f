//! Room configuration and room kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings for tracked rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum number of log lines kept per room. Older lines are dropped
    /// first.
    pub max_logs: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { max_logs: 5000 }
    }
}

// ---------------------------------------------------------------------------
// RoomKind
// ---------------------------------------------------------------------------

/// What kind of room the server opened, from `init|KIND`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    /// A chat room.
    Chat,
    /// A battle.
    Battle,
    /// Anything else the server may announce.
    Other(String),
}

impl RoomKind {
    /// Parses the `init` param.
    pub fn parse(kind: &str) -> Self {
        match kind.trim() {
            "chat" => Self::Chat,
            "battle" => Self::Battle,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => f.write_str("chat"),
            Self::Battle => f.write_str("battle"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}
