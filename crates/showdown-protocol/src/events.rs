//! Typed views of the messages the client interprets.
//!
//! Each payload is built from a decoded [`Message`] of the matching type
//! and fails with [`ProtocolError::InvalidMessage`] when a param is
//! missing.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{Message, MessageType, RoomId};
use crate::user::User;

fn param<'a>(msg: &'a Message, index: usize) -> Result<&'a str, ProtocolError> {
    msg.param(index).ok_or_else(|| {
        ProtocolError::InvalidMessage(format!(
            "{} message is missing param {index}: {:?}",
            msg.kind(),
            msg.line()
        ))
    })
}

fn expect_kind(msg: &Message, kinds: &[MessageType]) -> Result<(), ProtocolError> {
    if kinds.contains(msg.kind()) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidMessage(format!(
            "unexpected message type {}",
            msg.kind()
        )))
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat line in a room (`c`, `chat` or `c:`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Room the line was said in.
    pub room: RoomId,
    /// Server timestamp, for `c:` lines.
    pub timestamp: Option<i64>,
    /// Who said it.
    pub author: User,
    /// The text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a chat message from a `c`, `chat` or `c:` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::Chat, MessageType::TimestampedChat])?;
        let offset = usize::from(*msg.kind() == MessageType::TimestampedChat);
        let timestamp = if offset == 1 {
            param(msg, 0)?.trim().parse().ok()
        } else {
            None
        };
        Ok(Self {
            room: msg.room().clone(),
            timestamp,
            author: User::parse(param(msg, offset)?),
            content: msg.param(offset + 1).unwrap_or_default().to_owned(),
        })
    }
}

/// A private message (`pm|SENDER|RECEIVER|MESSAGE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    /// Sender.
    pub author: User,
    /// Receiver.
    pub recipient: User,
    /// The text.
    pub content: String,
}

impl PrivateMessage {
    /// Builds a private message from a `pm` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::Pm])?;
        Ok(Self {
            author: User::parse(param(msg, 0)?),
            recipient: User::parse(param(msg, 1)?),
            content: msg.param(2).unwrap_or_default().to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Query responses
// ---------------------------------------------------------------------------

/// A `queryresponse|TYPE|JSON` message.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Query type (`rooms`, `roomlist`, `userdetails`, ...).
    pub kind: String,
    /// Decoded payload. A payload that is not JSON is kept as a string.
    pub data: Value,
}

impl QueryResponse {
    /// Builds a query response from a `queryresponse` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::QueryResponse])?;
        let kind = param(msg, 0)?.to_owned();
        let raw = msg.param(1).unwrap_or("null");
        let data = serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::debug!(%kind, error = %err, "query response is not json");
            Value::String(raw.to_owned())
        });
        Ok(Self { kind, data })
    }

    /// The `userid` field of the payload, for keyed responses.
    pub fn user_id(&self) -> Option<&str> {
        self.data.get("userid").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// A login challenge (`challstr|KEYID|CHALLENGE`).
///
/// The token is kept whole, bars included, since that is what the
/// credential exchange expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The full challenge token.
    pub token: String,
}

impl Challenge {
    /// Builds a challenge from a `challstr` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::Challstr])?;
        let token = param(msg, 0)?;
        if token.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty challenge".into()));
        }
        Ok(Self {
            token: token.to_owned(),
        })
    }
}

/// The server's view of the connection's identity
/// (`updateuser|USER|NAMED|AVATAR|SETTINGS`).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateUser {
    /// Current user (guests get a generated name).
    pub user: User,
    /// Whether the user is logged in under a chosen name.
    pub named: bool,
    /// Avatar id.
    pub avatar: String,
    /// Settings object, if present and valid JSON.
    pub settings: Option<Value>,
}

impl UpdateUser {
    /// Builds an update from an `updateuser` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::UpdateUser])?;
        Ok(Self {
            user: User::parse(param(msg, 0)?),
            named: msg.param(1) == Some("1"),
            avatar: msg.param(2).unwrap_or_default().to_owned(),
            settings: msg.param(3).and_then(|s| serde_json::from_str(s).ok()),
        })
    }
}

/// Pending challenges, from `updatechallenges|JSON`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeUpdate {
    /// Challenges received: challenger id → format.
    pub challenges_from: Value,
    /// The outgoing challenge, if any.
    pub challenge_to: Value,
}

impl ChallengeUpdate {
    /// Builds an update from an `updatechallenges` message.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        expect_kind(msg, &[MessageType::UpdateChallenges])?;
        let data: Value = serde_json::from_str(param(msg, 0)?)?;
        Ok(Self {
            challenges_from: data.get("challengesFrom").cloned().unwrap_or(Value::Null),
            challenge_to: data.get("challengeTo").cloned().unwrap_or(Value::Null),
        })
    }
}
