//! Core protocol types: room ids, message types and decoded messages.
//!
//! Everything the server sends is a line of the form
//!
//! ```text
//! [ '>' room_id '\n' ] '|' type [ '|' param ]*
//! ```
//!
//! and the decoder turns each line into one immutable [`Message`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// The room a message is scoped to.
///
/// Records that arrive without a `>room` prefix (or with an empty one)
/// belong to no room in particular and are [`RoomId::Global`]: login
/// traffic, query responses, private messages and the like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomId {
    /// No room context.
    Global,
    /// A named room such as `lobby` or `battle-gen9ou-123`.
    Named(String),
}

impl RoomId {
    /// Creates a room id; an empty (or all-whitespace) name is `Global`.
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        if id.is_empty() {
            Self::Global
        } else {
            Self::Named(id.to_owned())
        }
    }

    /// Returns `true` for the global scope.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// The room name, or `""` for the global scope.
    ///
    /// This is also the room segment used when sending: the server reads
    /// an empty room as "no room".
    pub fn as_str(&self) -> &str {
        match self {
            Self::Global => "",
            Self::Named(id) => id,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("<global>"),
            Self::Named(id) => f.write_str(id),
        }
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The type of a message: the first bar-delimited token of a record.
///
/// Types the client interprets get their own variant; every other
/// well-formed type (battle log lines, tournament updates, ...) is kept
/// as [`MessageType::Other`] and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `init|ROOMTYPE`: the client joined a room.
    Init,
    /// `deinit`: the client left a room.
    Deinit,
    /// `title|TITLE`
    Title,
    /// `users|COUNT,USER,USER...`
    Users,
    /// `j|USER`, `J|USER`, `join|USER`
    Join,
    /// `l|USER`, `L|USER`, `leave|USER`
    Leave,
    /// `n|USER|OLDID`, `N|...`, `name|...`
    Name,
    /// `c|USER|MESSAGE`, `chat|USER|MESSAGE`
    Chat,
    /// `c:|TIMESTAMP|USER|MESSAGE`
    TimestampedChat,
    /// `pm|SENDER|RECEIVER|MESSAGE`
    Pm,
    /// `challstr|CHALLSTR`: login challenge.
    Challstr,
    /// `updateuser|USER|NAMED|AVATAR|SETTINGS`
    UpdateUser,
    /// `queryresponse|QUERYTYPE|JSON`
    QueryResponse,
    /// `updatechallenges|JSON`
    UpdateChallenges,
    /// `updatesearch|JSON`
    UpdateSearch,
    /// `popup|MESSAGE`
    Popup,
    /// `nametaken|USERNAME|MESSAGE`
    NameTaken,
    /// `raw|HTML`
    Raw,
    /// `html|HTML`
    Html,
    /// `uhtml|NAME|HTML`
    Uhtml,
    /// `error|MESSAGE`
    Error,
    /// A plain text line (no leading bar), logged as-is.
    Text,
    /// Any other well-formed type.
    Other(String),
}

impl MessageType {
    /// Maps a wire token to a message type. Never fails: unknown tokens
    /// become [`MessageType::Other`].
    pub fn parse(token: &str) -> Self {
        match token {
            "init" => Self::Init,
            "deinit" => Self::Deinit,
            "title" => Self::Title,
            "users" => Self::Users,
            "j" | "J" | "join" => Self::Join,
            "l" | "L" | "leave" => Self::Leave,
            "n" | "N" | "name" => Self::Name,
            "c" | "chat" => Self::Chat,
            "c:" => Self::TimestampedChat,
            "pm" => Self::Pm,
            "challstr" => Self::Challstr,
            "updateuser" => Self::UpdateUser,
            "queryresponse" => Self::QueryResponse,
            "updatechallenges" => Self::UpdateChallenges,
            "updatesearch" => Self::UpdateSearch,
            "popup" => Self::Popup,
            "nametaken" => Self::NameTaken,
            "raw" => Self::Raw,
            "html" => Self::Html,
            "uhtml" => Self::Uhtml,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Canonical token for this type.
    ///
    /// [`MessageType::Text`] has no wire token and reports `"text"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Deinit => "deinit",
            Self::Title => "title",
            Self::Users => "users",
            Self::Join => "j",
            Self::Leave => "l",
            Self::Name => "n",
            Self::Chat => "c",
            Self::TimestampedChat => "c:",
            Self::Pm => "pm",
            Self::Challstr => "challstr",
            Self::UpdateUser => "updateuser",
            Self::QueryResponse => "queryresponse",
            Self::UpdateChallenges => "updatechallenges",
            Self::UpdateSearch => "updatesearch",
            Self::Popup => "popup",
            Self::NameTaken => "nametaken",
            Self::Raw => "raw",
            Self::Html => "html",
            Self::Uhtml => "uhtml",
            Self::Error => "error",
            Self::Text => "text",
            Self::Other(token) => token,
        }
    }

    /// Returns `true` if `token` names a type the client interprets.
    ///
    /// Used to recognise records written without the leading bar.
    pub fn is_keyword(token: &str) -> bool {
        !matches!(Self::parse(token), Self::Other(_))
    }

    /// Maximum number of params for this type, if fixed.
    ///
    /// The last param of a fixed-arity type keeps any literal `|` it
    /// contains; types without a fixed arity split on every bar.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Deinit
            | Self::Init
            | Self::Title
            | Self::Users
            | Self::Join
            | Self::Leave
            | Self::Challstr
            | Self::UpdateChallenges
            | Self::UpdateSearch
            | Self::Popup
            | Self::Raw
            | Self::Html
            | Self::Error
            | Self::Text => Some(1),
            Self::Name | Self::Chat | Self::QueryResponse | Self::NameTaken | Self::Uhtml => {
                Some(2)
            }
            Self::TimestampedChat | Self::Pm => Some(3),
            Self::UpdateUser => Some(4),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MessageType {
    fn from(token: &str) -> Self {
        Self::parse(token)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One decoded record.
///
/// Immutable once built: the dispatcher consumes it, and handlers get
/// clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    room: RoomId,
    kind: MessageType,
    token: String,
    params: Vec<String>,
    line: String,
}

impl Message {
    /// Builds a message from its parts, rendering the wire line.
    pub fn new(room: RoomId, token: &str, params: Vec<String>) -> Self {
        let kind = MessageType::parse(token);
        let mut msg = Self {
            room,
            kind,
            token: token.to_owned(),
            params,
            line: String::new(),
        };
        msg.line = msg.to_wire();
        msg
    }

    /// Builds a plain text message (a line with no type).
    pub fn text(room: RoomId, line: &str) -> Self {
        Self {
            room,
            kind: MessageType::Text,
            token: String::new(),
            params: vec![line.to_owned()],
            line: line.to_owned(),
        }
    }

    pub(crate) fn decoded(room: RoomId, token: &str, params: Vec<String>, line: &str) -> Self {
        Self {
            room,
            kind: MessageType::parse(token),
            token: token.to_owned(),
            params,
            line: line.to_owned(),
        }
    }

    /// The room this message is scoped to.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// The interpreted type.
    pub fn kind(&self) -> &MessageType {
        &self.kind
    }

    /// The type token exactly as it appeared on the wire (`"J"`, `"c:"`).
    ///
    /// Empty for [`MessageType::Text`].
    pub fn token(&self) -> &str {
        &self.token
    }

    /// All params, in order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// The param at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The record text as received (or as rendered, for built messages).
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Renders the message back to its wire form, without room prefix.
    ///
    /// Text lines are returned verbatim; everything else is rendered as
    /// `|type|param|param...`.
    pub fn to_wire(&self) -> String {
        if self.kind == MessageType::Text {
            return self.params.concat();
        }
        let mut out = String::with_capacity(self.line.len().max(16));
        out.push('|');
        out.push_str(&self.token);
        for param in &self.params {
            out.push('|');
            out.push_str(param);
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.room, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_empty_is_global() {
        assert_eq!(RoomId::new(""), RoomId::Global);
        assert_eq!(RoomId::new("  "), RoomId::Global);
        assert_eq!(RoomId::new("lobby"), RoomId::Named("lobby".into()));
    }

    #[test]
    fn test_room_id_as_str_global_is_empty() {
        assert_eq!(RoomId::Global.as_str(), "");
        assert_eq!(RoomId::from("techcode").as_str(), "techcode");
    }

    #[test]
    fn test_message_type_parse_aliases() {
        assert_eq!(MessageType::parse("J"), MessageType::Join);
        assert_eq!(MessageType::parse("join"), MessageType::Join);
        assert_eq!(MessageType::parse("chat"), MessageType::Chat);
        assert_eq!(MessageType::parse("c:"), MessageType::TimestampedChat);
        assert_eq!(
            MessageType::parse("-damage"),
            MessageType::Other("-damage".into())
        );
    }

    #[test]
    fn test_message_type_is_keyword() {
        assert!(MessageType::is_keyword("init"));
        assert!(MessageType::is_keyword("deinit"));
        assert!(!MessageType::is_keyword("Welcome"));
        assert!(!MessageType::is_keyword("switch"));
    }

    #[test]
    fn test_message_new_renders_wire_line() {
        let msg = Message::new(
            RoomId::new("lobby"),
            "c",
            vec!["+raj".into(), "a|b".into()],
        );
        assert_eq!(msg.line(), "|c|+raj|a|b");
        assert_eq!(msg.kind(), &MessageType::Chat);
        assert_eq!(msg.param(1), Some("a|b"));
        assert_eq!(msg.param(2), None);
    }

    #[test]
    fn test_text_message_to_wire_is_verbatim() {
        let msg = Message::text(RoomId::Global, "Welcome to the lobby!");
        assert_eq!(msg.to_wire(), "Welcome to the lobby!");
        assert_eq!(msg.token(), "");
    }
}
