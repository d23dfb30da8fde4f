//! Transport framing.
//!
//! The public server is reached through SockJS, which wraps payloads in
//! its own frames:
//!
//! | frame            | meaning                          |
//! |------------------|----------------------------------|
//! | `o`              | connection open                  |
//! | `h`              | heartbeat                        |
//! | `a["p1","p2"]`   | one or more payloads             |
//! | `c[3000,"bye"]`  | server is closing the connection |
//!
//! Outbound lines are sent as a one-element JSON array. Servers reached
//! on their plain WebSocket endpoint use [`Framing::Raw`], where every
//! frame is a payload as-is.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// How payloads are wrapped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// SockJS frames (`o`, `h`, `a[...]`, `c[...]`).
    #[default]
    SockJs,
    /// Bare text frames.
    Raw,
}

/// One unwrapped inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The server accepted the session.
    Open,
    /// Keep-alive, carries nothing.
    Heartbeat,
    /// Payloads to hand to the decoder, in order.
    Payloads(Vec<String>),
    /// The server is closing the session.
    Close {
        /// Close code sent by the server.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

impl Framing {
    /// Unwraps one inbound transport frame.
    pub fn unwrap_frame(self, frame: &str) -> Result<Frame, ProtocolError> {
        match self {
            Self::Raw => Ok(Frame::Payloads(vec![frame.to_owned()])),
            Self::SockJs => unwrap_sockjs(frame),
        }
    }

    /// Wraps one outbound line for the wire.
    pub fn wrap(self, line: &str) -> Result<String, ProtocolError> {
        match self {
            Self::Raw => Ok(line.to_owned()),
            Self::SockJs => Ok(serde_json::to_string(&[line])?),
        }
    }

    /// Whether the server announces the session with an open frame.
    ///
    /// Without one, the session is ready as soon as the socket connects.
    pub fn announces_open(self) -> bool {
        matches!(self, Self::SockJs)
    }
}

fn unwrap_sockjs(frame: &str) -> Result<Frame, ProtocolError> {
    let mut chars = frame.chars();
    let tag = chars
        .next()
        .ok_or_else(|| ProtocolError::Frame("empty frame".into()))?;
    let body = chars.as_str();

    match tag {
        'o' => Ok(Frame::Open),
        'h' => Ok(Frame::Heartbeat),
        'a' => Ok(Frame::Payloads(serde_json::from_str(body)?)),
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(body)?;
            Ok(Frame::Close { code, reason })
        }
        other => Err(ProtocolError::Frame(format!("unknown frame type {other:?}"))),
    }
}
