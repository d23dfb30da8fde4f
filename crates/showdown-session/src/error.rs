//! Error types for the session layer.

/// Errors that can occur while logging in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The login was rejected: bad credentials, a taken name, or a
    /// confirmation for a different user than requested.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A login was requested before the server sent a challenge.
    #[error("no login challenge received yet")]
    NoChallenge,

    /// Autologin is enabled but no credentials are configured.
    #[error("no credentials configured")]
    NotConfigured,

    /// An assertion was submitted with no login in progress.
    #[error("no login in progress")]
    NotInProgress,

    /// The credential exchange could not be completed.
    #[error("credential exchange failed: {0}")]
    Exchange(String),

    /// The credential exchange answered with something unreadable.
    #[error("invalid credential exchange response: {0}")]
    InvalidResponse(String),

    /// The configured endpoint does not offer this action.
    #[error("{0} is not supported by this endpoint")]
    Unsupported(&'static str),
}
