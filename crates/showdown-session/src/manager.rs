//! The auth manager: the login handshake as a state machine.
//!
//! The manager is owned by the client's reader task and only ever called
//! from there, between receiving a message and handing it to handlers. It
//! does no I/O: when the handshake needs the credential exchange it
//! returns [`AuthAction::Exchange`] and the client runs the exchange
//! elsewhere, reporting back through [`AuthManager::submit`] or
//! [`AuthManager::exchange_failed`].

use showdown_protocol::{Challenge, Message, MessageType, UpdateUser, outbound, to_id};

use crate::{AuthState, CredentialRequest, Credentials, Session, SessionConfig, SessionError};

/// What the client should do after a handshake step.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Run the credential exchange with this request.
    Exchange(CredentialRequest),
    /// The server confirmed the login.
    LoggedIn(Session),
    /// The login failed.
    Failed(SessionError),
}

/// Drives the login handshake for one connection at a time.
pub struct AuthManager {
    session: Session,
    config: SessionConfig,
    /// Name of the login in flight, set from `login` until confirmed.
    pending: Option<String>,
}

impl AuthManager {
    /// Creates a manager in the `Disconnected` state.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: Session::default(),
            config,
            pending: None,
        }
    }

    /// The current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The current handshake state.
    pub fn state(&self) -> AuthState {
        self.session.state
    }

    /// Whether a credential exchange is under way: a login was started and
    /// its assertion has not been submitted.
    pub fn is_exchanging(&self) -> bool {
        self.pending.is_some() && self.session.state == AuthState::ChallengeReceived
    }

    /// Applies one decoded message and returns the next step, if any.
    pub fn on_message(&mut self, msg: &Message) -> Option<AuthAction> {
        match msg.kind() {
            MessageType::Challstr => self.on_challenge(msg),
            MessageType::UpdateUser => self.on_update_user(msg),
            MessageType::NameTaken => self.on_name_taken(msg),
            _ => None,
        }
    }

    /// Starts a login with `credentials` against the stored challenge.
    ///
    /// # Errors
    /// Returns [`SessionError::NoChallenge`] if no challenge has been
    /// received on this connection.
    pub fn login(&mut self, credentials: &Credentials) -> Result<CredentialRequest, SessionError> {
        let challenge = self
            .session
            .challenge
            .clone()
            .ok_or(SessionError::NoChallenge)?;

        self.pending = Some(credentials.username.clone());
        tracing::debug!(username = %credentials.username, "starting credential exchange");
        Ok(CredentialRequest {
            challenge,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    /// Records a successful exchange and returns the `/trn` line to send.
    ///
    /// # Errors
    /// Returns [`SessionError::NotInProgress`] if no login was started, or
    /// the connection was reset since.
    pub fn submit(&mut self, assertion: &str) -> Result<String, SessionError> {
        let username = self.pending.as_deref().ok_or(SessionError::NotInProgress)?;
        let line = outbound::trn(username, assertion);

        self.session.state = AuthState::CredentialsSubmitted;
        self.session.session_cookie = Some(assertion.to_owned());
        tracing::debug!(%username, "credentials submitted");
        Ok(line)
    }

    /// Records a failed exchange.
    pub fn exchange_failed(&mut self, err: SessionError) -> AuthAction {
        self.fail(err)
    }

    /// Forgets everything about the current connection.
    pub fn reset(&mut self) {
        self.session = Session::default();
        self.pending = None;
    }

    // -----------------------------------------------------------------------
    // Message handlers
    // -----------------------------------------------------------------------

    fn on_challenge(&mut self, msg: &Message) -> Option<AuthAction> {
        let challenge = match Challenge::from_message(msg) {
            Ok(challenge) => challenge,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed challenge");
                return None;
            }
        };

        self.session.challenge = Some(challenge.token);
        self.session.state = AuthState::ChallengeReceived;
        self.session.session_cookie = None;
        self.pending = None;
        tracing::debug!("login challenge received");

        if !self.config.autologin {
            return None;
        }
        match self.config.credentials.clone() {
            Some(credentials) => self.login(&credentials).ok().map(AuthAction::Exchange),
            None => Some(self.fail(SessionError::NotConfigured)),
        }
    }

    fn on_update_user(&mut self, msg: &Message) -> Option<AuthAction> {
        let update = match UpdateUser::from_message(msg) {
            Ok(update) => update,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed user update");
                return None;
            }
        };

        if self.session.state != AuthState::CredentialsSubmitted {
            self.session.username = Some(update.user.name);
            return None;
        }
        // The guest identity may still be announced after /trn went out.
        if !update.named {
            return None;
        }

        let expected = self.pending.take().unwrap_or_default();
        if to_id(&expected) != update.user.id {
            return Some(self.fail(SessionError::AuthFailed(format!(
                "server confirmed {:?}, expected {expected:?}",
                update.user.name
            ))));
        }

        self.session.username = Some(update.user.name);
        self.session.state = AuthState::Authenticated;
        tracing::info!(username = ?self.session.username, "logged in");
        Some(AuthAction::LoggedIn(self.session.clone()))
    }

    fn on_name_taken(&mut self, msg: &Message) -> Option<AuthAction> {
        if !matches!(
            self.session.state,
            AuthState::ChallengeReceived | AuthState::CredentialsSubmitted
        ) {
            return None;
        }
        let reason = format!(
            "name {:?} unavailable: {}",
            msg.param(0).unwrap_or_default(),
            msg.param(1).unwrap_or_default()
        );
        Some(self.fail(SessionError::AuthFailed(reason)))
    }

    fn fail(&mut self, err: SessionError) -> AuthAction {
        tracing::warn!(error = %err, state = %self.session.state, "login failed");
        self.session.state = AuthState::Disconnected;
        self.session.session_cookie = None;
        self.pending = None;
        AuthAction::Failed(err)
    }
}
