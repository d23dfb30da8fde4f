//! Login handshake and session state for the Showdown client.
//!
//! Logging in takes a round trip through a separate HTTP service:
//!
//! 1. The server sends a challenge (`challstr`).
//! 2. The client trades the challenge plus credentials for a signed
//!    assertion ([`CredentialExchange`]).
//! 3. The client sends the assertion back (`/trn`).
//! 4. The server confirms the new identity (`updateuser`).
//!
//! [`AuthManager`] tracks where the connection is in that sequence and
//! tells the client what to do next. It never performs I/O itself.
//!
//! # Feature Flags
//!
//! - `http`: [`ActionEndpoint`], a `reqwest` based exchange

#![allow(async_fn_in_trait)]

mod auth;
mod error;
#[cfg(feature = "http")]
mod http;
mod manager;
mod session;

pub use auth::{
    CredentialExchange, CredentialRequest, parse_action_response, parse_assertion,
    replay_upload_form,
};
pub use error::SessionError;
#[cfg(feature = "http")]
pub use http::{ActionEndpoint, DEFAULT_ACTION_URL};
pub use manager::{AuthAction, AuthManager};
pub use session::{AuthState, Credentials, Session, SessionConfig};
