//! Wire protocol for the Showdown client.
//!
//! This crate knows how the service talks, and nothing about connections
//! or state:
//!
//! - **Framing** ([`Framing`], [`Frame`]): unwrapping SockJS frames into
//!   payloads and wrapping outbound lines.
//! - **Decoding** ([`decode`]): splitting payloads into room-scoped
//!   [`Message`]s.
//! - **Events** ([`ChatMessage`], [`QueryResponse`], ...): typed views of
//!   the messages the client interprets.
//! - **Outbound** ([`outbound`]): builders for the lines the client sends.
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Framing (payloads) → Decoder (Message) → Client
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod decode;
mod error;
mod events;
mod framing;
pub mod outbound;
mod types;
mod user;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use decode::{decode, decode_record};
pub use error::ProtocolError;
pub use events::{
    Challenge, ChallengeUpdate, ChatMessage, PrivateMessage, QueryResponse, UpdateUser,
};
pub use framing::{Frame, Framing};
pub use types::{Message, MessageType, RoomId};
pub use user::{NO_RANK, User, to_id};
