//! Session types: who the connection is logged in as, and how far along
//! the handshake it is.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Login credentials.
///
/// An empty password logs in to an unregistered name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Display name to log in as.
    pub username: String,
    /// Account password.
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for the login handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Credentials used for autologin.
    pub credentials: Option<Credentials>,

    /// Log in with `credentials` as soon as the server sends a challenge.
    ///
    /// When off, the connection stays a guest until the application logs
    /// in explicitly.
    pub autologin: bool,
}

impl SessionConfig {
    /// Config that logs in with `credentials` on every connection.
    pub fn autologin(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            autologin: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// Where the connection is in the login handshake.
///
/// ```text
/// Disconnected ──challstr──→ ChallengeReceived ──/trn──→ CredentialsSubmitted
///      ↑                                                         │
///      └──────── reset / failure ─────── Authenticated ←─updateuser┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthState {
    /// No challenge yet, or the last login failed.
    #[default]
    Disconnected,
    /// The server sent a challenge.
    ChallengeReceived,
    /// An assertion was sent, waiting for the server to confirm.
    CredentialsSubmitted,
    /// Logged in.
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ChallengeReceived => write!(f, "ChallengeReceived"),
            Self::CredentialsSubmitted => write!(f, "CredentialsSubmitted"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The connection's identity as last reported by the server.
///
/// Handlers receive clones of this; only the
/// [`AuthManager`](crate::AuthManager) changes it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Current name, guest names included.
    pub username: Option<String>,
    /// Handshake progress.
    pub state: AuthState,
    /// The last challenge the server sent.
    pub challenge: Option<String>,
    /// The assertion the login was completed with.
    pub session_cookie: Option<String>,
}

impl Session {
    /// Returns `true` once the server confirmed the login.
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("state", &self.state)
            .field("challenge", &self.challenge.as_ref().map(|_| "<set>"))
            .field("session_cookie", &self.session_cookie.as_ref().map(|_| "<set>"))
            .finish()
    }
}
