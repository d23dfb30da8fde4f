//! Error types for the room layer.

use showdown_protocol::RoomId;

/// Errors that can occur while tracking rooms.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A room-scoped message arrived for a room that was never initialised.
    ///
    /// Non-fatal: the message is still dispatched to handlers.
    #[error("message for unknown room {0}")]
    UnknownRoom(RoomId),
}
