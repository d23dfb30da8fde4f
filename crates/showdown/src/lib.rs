//! # Showdown
//!
//! Async client for the Pokémon Showdown chat and battle protocol.
//!
//! The client keeps one connection to the server, logs in, decodes the
//! room-multiplexed message stream, tracks rooms, pairs query responses
//! with their queries and hands everything to your hooks. Hooks run in
//! their own tasks: a slow or failing hook never holds up the connection
//! or the other hooks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use showdown::prelude::*;
//!
//! let client = Client::builder(WebSocketConnector::new())
//!     .on_connect(|ctx| async move {
//!         ctx.handle().join("lobby")?;
//!         Ok(())
//!     })
//!     .on_chat_message(|msg, ctx| async move {
//!         if msg.content == "ping" {
//!             ctx.handle().reply(&msg, "pong")?;
//!         }
//!         Ok(())
//!     })
//!     .build();
//! client.run().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `websocket` (default): [`WebSocketConnector`](showdown_transport::WebSocketConnector)
//! - `http`: `ActionEndpoint`, logging in through the public login service

mod client;
mod config;
mod dispatch;
mod error;
mod handle;
mod hooks;
mod interval;
mod outbox;
mod query;
mod supervisor;

pub use client::{Client, ClientBuilder, NoExchange};
pub use config::{
    ClientConfig, DEFAULT_HOST, ReconnectPolicy, SERVER_INFO_URL, ServerConfig, parse_server_info,
};
pub use error::ClientError;
pub use handle::ClientHandle;
pub use hooks::{BoxError, Context, Event, EventKey, HandlerResult, Hook, IntervalHook, Snapshot};
pub use outbox::SendOptions;
pub use query::{Query, QueryCorrelator, QueryKey, QueryResult};

pub use showdown_interval::{IntervalConfig, IntervalPolicy};
pub use showdown_protocol::{
    ChallengeUpdate, ChatMessage, Framing, Message, MessageType, PrivateMessage, ProtocolError,
    QueryResponse, RoomId, User, to_id,
};
pub use showdown_room::{Room, RoomConfig, RoomError, RoomKind, Rooms};
pub use showdown_session::{
    AuthState, CredentialExchange, CredentialRequest, Credentials, Session, SessionConfig,
    SessionError,
};
#[cfg(feature = "http")]
pub use showdown_session::ActionEndpoint;
pub use showdown_transport::{Connection, Connector, TransportError};

/// Everything a typical bot needs.
pub mod prelude {
    pub use crate::{
        BoxError, ChatMessage, Client, ClientBuilder, ClientConfig, ClientError, ClientHandle, Context,
        Credentials, Event, EventKey, HandlerResult, Hook, IntervalHook, Message, MessageType,
        PrivateMessage, Query, ReconnectPolicy, Room, RoomId, SendOptions, ServerConfig, Session,
    };
    #[cfg(feature = "websocket")]
    pub use showdown_transport::WebSocketConnector;
}
