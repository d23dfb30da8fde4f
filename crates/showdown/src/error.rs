//! Unified error type for the Showdown client.

use std::time::Duration;

use showdown_protocol::ProtocolError;
use showdown_room::RoomError;
use showdown_session::SessionError;
use showdown_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `showdown` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each wrapping variant generates `From` impls, so `?` converts
/// sub-crate errors automatically.
///
/// Not every error ends the client. Decode failures, messages for unknown
/// rooms, handler failures and query timeouts are reported on the
/// diagnostics channel ([`ClientHandle::diagnostics`]) and processing
/// carries on.
///
/// [`ClientHandle::diagnostics`]: crate::ClientHandle::diagnostics
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed record or frame, content too long).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A login error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-tracking error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A query with the same correlation key is already outstanding.
    #[error("a query for {0} is already pending")]
    Conflict(String),

    /// No response arrived before the query deadline.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// A server could not be looked up by id.
    #[error("server lookup failed: {0}")]
    ServerInfo(String),

    /// The client was closed.
    #[error("client closed")]
    Closed,

    /// The connection was lost.
    #[error("connection lost")]
    Disconnected,

    /// A handler returned an error or panicked.
    #[error("handler {handler} failed: {message}")]
    Handler {
        /// Name of the failing registration.
        handler: String,
        /// What went wrong.
        message: String,
    },
}

impl ClientError {
    /// Returns `true` if this is a rejected login.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Session(SessionError::AuthFailed(_)))
    }
}
