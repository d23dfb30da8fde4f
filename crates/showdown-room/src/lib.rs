//! Room state tracking for the Showdown client.
//!
//! The server tells the client which rooms it is in: `init` opens a room,
//! `deinit` closes it, and everything in between is that room's log. This
//! crate mirrors that state so handlers can look it up.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: owns every tracked room, applies messages
//! - [`Room`]: one room's title, users and bounded log
//! - [`RoomChange`]: what applying a message did
//! - [`RoomConfig`]: log bound and other settings

mod config;
mod error;
mod registry;
mod room;

pub use config::{RoomConfig, RoomKind};
pub use error::RoomError;
pub use registry::{RoomChange, RoomRegistry, Rooms};
pub use room::Room;
