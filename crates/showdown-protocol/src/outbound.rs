//! Builders for outbound lines.
//!
//! Every outbound line has the form `ROOM|TEXT`, where an empty room means
//! "no room" and commands start with `/`. The builders here only format
//! lines; framing and sending are the client's job.

use std::borrow::Cow;

use crate::error::ProtocolError;
use crate::types::RoomId;
use crate::user::to_id;

/// Maximum chat message length the server accepts, in characters.
pub const MAX_CHAT_LENGTH: usize = 300;

/// Checks chat content against [`MAX_CHAT_LENGTH`].
///
/// Over-long content is truncated (with a warning) unless `strict`, in
/// which case it is rejected.
pub fn clean_content(content: &str, strict: bool) -> Result<Cow<'_, str>, ProtocolError> {
    let len = content.chars().count();
    if len <= MAX_CHAT_LENGTH {
        return Ok(Cow::Borrowed(content));
    }
    if strict {
        return Err(ProtocolError::ContentTooLong {
            len,
            max: MAX_CHAT_LENGTH,
        });
    }
    tracing::warn!(len, max = MAX_CHAT_LENGTH, "chat content truncated");
    Ok(Cow::Owned(content.chars().take(MAX_CHAT_LENGTH).collect()))
}

/// `|/join ROOM`
pub fn join(room: &str) -> String {
    format!("|/join {room}")
}

/// `ROOM|/leave`
pub fn leave(room: &RoomId) -> String {
    format!("{}|/leave", room.as_str())
}

/// `ROOM|TEXT`: says `content` in `room`.
pub fn reply(room: &RoomId, content: &str, strict: bool) -> Result<String, ProtocolError> {
    let content = clean_content(content, strict)?;
    Ok(format!("{}|{content}", room.as_str()))
}

/// `|/msg USERID, TEXT`
pub fn private_message(user: &str, content: &str, strict: bool) -> Result<String, ProtocolError> {
    let content = clean_content(content, strict)?;
    Ok(format!("|/msg {}, {content}", to_id(user)))
}

/// `ROOM|/COMMAND ARG, ARG`
pub fn command(room: &RoomId, name: &str, args: &[&str]) -> String {
    if args.is_empty() {
        format!("{}|/{name}", room.as_str())
    } else {
        format!("{}|/{name} {}", room.as_str(), args.join(", "))
    }
}

/// `|/cmd QUERY`: an information query answered by `queryresponse`.
pub fn query(params: &str) -> String {
    format!("|/cmd {params}")
}

/// `|/trn NAME,0,ASSERTION`: completes a login.
pub fn trn(name: &str, assertion: &str) -> String {
    format!("|/trn {name},0,{assertion}")
}

/// `|/avatar ID`
pub fn avatar(id: &str) -> String {
    format!("|/avatar {id}")
}

/// `BATTLE|/savereplay`
pub fn save_replay(battle: &RoomId) -> String {
    command(battle, "savereplay", &[])
}

/// `BATTLE|/forfeit`
pub fn forfeit(battle: &RoomId) -> String {
    command(battle, "forfeit", &[])
}

// ---------------------------------------------------------------------------
// Ladder and challenges
// ---------------------------------------------------------------------------

/// `|/utm TEAM`: sets the team for the next search or challenge.
///
/// `team` is in the service's packed format; an empty team (random
/// formats) is sent as `null`.
pub fn upload_team(team: &str) -> String {
    let team = if team.is_empty() { "null" } else { team };
    format!("|/utm {team}")
}

/// `|/search FORMAT`: searches for a ladder battle.
pub fn search(format: &str) -> String {
    format!("|/search {}", to_id(format))
}

/// `|/cancelsearch`
pub fn cancel_search() -> String {
    "|/cancelsearch".to_owned()
}

/// `|/challenge USERID, FORMAT`
pub fn challenge(user: &str, format: &str) -> String {
    command(&RoomId::Global, "challenge", &[&to_id(user), &to_id(format)])
}

/// `|/accept USERID`
pub fn accept_challenge(user: &str) -> String {
    command(&RoomId::Global, "accept", &[&to_id(user)])
}

/// `|/reject USERID`
pub fn reject_challenge(user: &str) -> String {
    command(&RoomId::Global, "reject", &[&to_id(user)])
}

/// `|/cancelchallenge`
pub fn cancel_challenge() -> String {
    command(&RoomId::Global, "cancelchallenge", &[])
}
