//! Error types for the protocol layer.
//!
//! Every failure here is local to one record or one frame: the decoder
//! reports it and moves on to the next record.

/// Errors that can occur while decoding or building protocol lines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A record could not be decoded into a message.
    ///
    /// Carries the offending record so it can be logged verbatim.
    #[error("decode failed ({reason}): {record:?}")]
    Decode {
        /// The record text as received.
        record: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A transport frame did not follow the framing rules.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// JSON embedded in a frame or a message was invalid.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Chat content exceeds the service limit and strict mode was requested.
    #[error("message content too long ({len} > {max} characters)")]
    ContentTooLong {
        /// Length of the rejected content, in characters.
        len: usize,
        /// The limit.
        max: usize,
    },

    /// A message decoded fine but does not have the shape its type requires.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    pub(crate) fn decode(record: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            record: record.to_owned(),
            reason: reason.into(),
        }
    }
}
