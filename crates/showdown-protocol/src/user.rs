//! User strings and ids.
//!
//! The server sends users as a display name with an optional one
//! character rank in front (`"+Zarel"`, `"@Some Mod"`, `" Guest 1"`) and,
//! in room user lists, an optional `@status` suffix. Users are compared
//! by their id: the name lowercased with everything but ASCII letters and
//! digits removed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rank used when a user string carries none.
pub const NO_RANK: char = ' ';

/// Converts a display name into its id (`"Some Mod"` → `"somemod"`).
pub fn to_id(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A user as seen in a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Room rank symbol, or [`NO_RANK`].
    pub rank: char,
    /// Display name.
    pub name: String,
    /// Normalised id, see [`to_id`].
    pub id: String,
}

impl User {
    /// Parses a user string as sent by the server.
    pub fn parse(raw: &str) -> Self {
        let mut chars = raw.chars();
        let (rank, rest) = match chars.next() {
            Some(c) if !c.is_ascii_alphanumeric() => (c, chars.as_str()),
            _ => (NO_RANK, raw),
        };
        let name = rest.split('@').next().unwrap_or_default().trim();
        Self {
            rank,
            name: name.to_owned(),
            id: to_id(name),
        }
    }

    /// Returns `true` if this user is `name` (compared by id).
    pub fn is(&self, name: &str) -> bool {
        self.id == to_id(name)
    }

    /// Whether the user holds any rank.
    pub fn has_rank(&self) -> bool {
        self.rank != NO_RANK
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_rank() {
            write!(f, "{}{}", self.rank, self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}
