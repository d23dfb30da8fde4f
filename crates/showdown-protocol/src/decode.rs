//! The frame decoder: payload text in, messages out.
//!
//! A payload is one or more newline-delimited records. A record starting
//! with `>` is a room prefix and scopes every following record up to the
//! next prefix or the end of the payload:
//!
//! ```text
//! >lobby
//! |init|chat
//! |title|Lobby
//! |c|+raj|hi everyone
//! ```
//!
//! Decoding never aborts: a malformed record yields one
//! [`ProtocolError::Decode`] in its slot and the rest of the payload is
//! decoded as usual.

use crate::error::ProtocolError;
use crate::types::{Message, MessageType, RoomId};

/// Decodes every record in `payload`, in order.
///
/// Blank lines and room prefixes produce no entry; every other line
/// produces exactly one `Ok` or `Err`.
pub fn decode(payload: &str) -> Vec<Result<Message, ProtocolError>> {
    let mut room = RoomId::Global;
    let mut out = Vec::new();

    for line in payload.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(prefix) = line.strip_prefix('>') {
            room = RoomId::new(prefix);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        out.push(decode_record(room.clone(), line));
    }

    out
}

/// Decodes a single record already known to belong to `room`.
pub fn decode_record(room: RoomId, line: &str) -> Result<Message, ProtocolError> {
    let body = match line.strip_prefix('|') {
        Some(body) => body,
        None => {
            // Records written without the leading bar are only typed when
            // they open with a keyword; anything else is plain text.
            let head = line.split('|').next().unwrap_or_default();
            if !MessageType::is_keyword(head) {
                return Ok(Message::text(room, line));
            }
            line
        }
    };

    let (token, rest) = match body.split_once('|') {
        Some((token, rest)) => (token, Some(rest)),
        None => (body, None),
    };
    validate_token(line, token)?;

    let kind = MessageType::parse(token);
    let params = split_params(rest, kind.arity());
    Ok(Message::decoded(room, token, params, line))
}

fn validate_token(line: &str, token: &str) -> Result<(), ProtocolError> {
    if token.is_empty() {
        return Err(ProtocolError::decode(line, "empty message type"));
    }
    if let Some(bad) = token
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')))
    {
        return Err(ProtocolError::decode(
            line,
            format!("invalid character {bad:?} in message type"),
        ));
    }
    Ok(())
}

fn split_params(rest: Option<&str>, arity: Option<usize>) -> Vec<String> {
    let Some(rest) = rest else {
        return Vec::new();
    };
    match arity {
        Some(0) => Vec::new(),
        Some(n) => rest.splitn(n, '|').map(str::to_owned).collect(),
        None => rest.split('|').map(str::to_owned).collect(),
    }
}
