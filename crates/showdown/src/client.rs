//! `Client` builder and entry point.
//!
//! This is where the layers are wired together: transport → framing →
//! decoder → rooms / queries / login → hooks.

use std::future::Future;
use std::time::Duration;

use showdown_protocol::{ChallengeUpdate, ChatMessage, Message, MessageType, PrivateMessage, QueryResponse};
use showdown_room::Room;
use showdown_session::{CredentialExchange, CredentialRequest, Credentials, Session, SessionError};
use showdown_transport::Connector;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::{ClientConfig, ReconnectPolicy, ServerConfig};
use crate::dispatch::DIAGNOSTICS_CAPACITY;
use crate::handle::ClientHandle;
use crate::hooks::{Context, HandlerResult, Hook, IntervalHook, Snapshot};
use crate::interval::run_interval;
use crate::outbox::Outbox;
use crate::supervisor::{Parts, Supervisor};
use crate::ClientError;

/// The exchange used when none is configured. Every login fails with
/// [`SessionError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExchange;

impl CredentialExchange for NoExchange {
    async fn exchange(&self, _request: CredentialRequest) -> Result<String, SessionError> {
        Err(SessionError::NotConfigured)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use showdown::prelude::*;
///
/// let client = Client::builder(WebSocketConnector::new())
///     .server(ServerConfig::websocket("localhost:8000"))
///     .on_connect(|ctx| async move {
///         ctx.handle().join("lobby")?;
///         Ok(())
///     })
///     .build();
/// client.run().await?;
/// ```
pub struct ClientBuilder<C, E = NoExchange> {
    connector: C,
    exchange: E,
    config: ClientConfig,
    hooks: Vec<Hook>,
    intervals: Vec<IntervalHook>,
}

impl<C: Connector> ClientBuilder<C> {
    /// Creates a builder with default settings.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            exchange: NoExchange,
            config: ClientConfig::default(),
            hooks: Vec::new(),
            intervals: Vec::new(),
        }
    }
}

impl<C, E> ClientBuilder<C, E>
where
    C: Connector,
    E: CredentialExchange,
{
    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the server endpoint.
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Logs in with `credentials` on every connection.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.session.credentials = Some(credentials);
        self.config.session.autologin = true;
        self
    }

    /// Turns autologin on or off.
    pub fn autologin(mut self, autologin: bool) -> Self {
        self.config.session.autologin = autologin;
        self
    }

    /// Sets how challenges are traded for assertions.
    pub fn credential_exchange<E2: CredentialExchange>(self, exchange: E2) -> ClientBuilder<C, E2> {
        ClientBuilder {
            connector: self.connector,
            exchange,
            config: self.config,
            hooks: self.hooks,
            intervals: self.intervals,
        }
    }

    /// Uses the public HTTP login endpoint for the credential exchange.
    #[cfg(feature = "http")]
    pub fn action_endpoint(self) -> ClientBuilder<C, showdown_session::ActionEndpoint> {
        self.credential_exchange(showdown_session::ActionEndpoint::default())
    }

    /// Sets how long queries wait for their response.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Sets the pause after each outbound line.
    pub fn send_throttle(mut self, throttle: Duration) -> Self {
        self.config.send_throttle = throttle;
        self
    }

    /// Rejects over-long chat content instead of truncating it.
    pub fn strict_length(mut self, strict: bool) -> Self {
        self.config.strict_length = strict;
        self
    }

    /// Reconnects with `policy` when the connection drops.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = Some(policy);
        self
    }

    /// Caps the log lines kept per room.
    pub fn max_logs(mut self, max_logs: usize) -> Self {
        self.config.rooms.max_logs = max_logs;
        self
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Registers a hook.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Registers an interval hook.
    pub fn interval(mut self, hook: IntervalHook) -> Self {
        self.intervals.push(hook);
        self
    }

    /// Runs `f` whenever a connection is ready.
    pub fn on_connect<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::connect(f))
    }

    /// Runs `f` when the server confirms a login.
    pub fn on_login<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Session, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::login(f))
    }

    /// Runs `f` when a room is opened.
    pub fn on_room_init<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Room, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::room_init(f))
    }

    /// Runs `f` when a room is closed.
    pub fn on_room_deinit<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Room, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::room_deinit(f))
    }

    /// Runs `f` for every query response.
    pub fn on_query_response<F, Fut>(self, f: F) -> Self
    where
        F: Fn(QueryResponse, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::query_response(f))
    }

    /// Runs `f` for every chat line.
    pub fn on_chat_message<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ChatMessage, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::chat_message(f))
    }

    /// Runs `f` for every private message.
    pub fn on_private_message<F, Fut>(self, f: F) -> Self
    where
        F: Fn(PrivateMessage, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::private_message(f))
    }

    /// Runs `f` when the pending challenges change.
    pub fn on_challenge_update<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ChallengeUpdate, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::challenge_update(f))
    }

    /// Runs `f` for every message.
    pub fn on_receive<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::any(f))
    }

    /// Runs `f` for every message of type `kind`.
    pub fn on<F, Fut>(self, kind: MessageType, f: F) -> Self
    where
        F: Fn(Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.hook(Hook::message(kind, f))
    }

    /// Runs `f` every `period` while connected.
    pub fn every<F, Fut>(self, period: Duration, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.interval(IntervalHook::new(period, f))
    }

    /// Builds the client. Nothing connects until [`Client::run`].
    pub fn build(self) -> Client<C, E> {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing) = mpsc::unbounded_channel();
        let (state, snapshot) = watch::channel(Snapshot::default());
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);

        let handle = ClientHandle::new(
            commands_tx,
            outgoing_tx,
            snapshot,
            diagnostics.clone(),
            self.config.strict_length,
        );
        let supervisor = Supervisor::new(Parts {
            connector: self.connector,
            exchange: self.exchange,
            config: self.config,
            handle: handle.clone(),
            commands,
            outbox: Outbox::new(outgoing),
            state,
            diagnostics,
        });

        Client {
            handle,
            supervisor,
            hooks: self.hooks,
            intervals: self.intervals,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A Showdown client.
///
/// Take a [`handle()`](Self::handle) before calling
/// [`run()`](Self::run), which consumes the client.
pub struct Client<C, E = NoExchange> {
    handle: ClientHandle,
    supervisor: Supervisor<C, E>,
    hooks: Vec<Hook>,
    intervals: Vec<IntervalHook>,
}

impl<C: Connector> Client<C> {
    /// Creates a builder.
    pub fn builder(connector: C) -> ClientBuilder<C> {
        ClientBuilder::new(connector)
    }
}

impl<C, E> Client<C, E>
where
    C: Connector,
    E: CredentialExchange,
{
    /// A handle for sending, querying and reading state.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Connects and processes messages until the client is closed.
    ///
    /// # Errors
    /// - [`ClientError::Transport`] if connecting fails and no reconnect
    ///   policy is set (or its attempts are used up)
    /// - [`ClientError::Disconnected`] if an established connection drops
    ///   under the same conditions
    /// - [`ClientError::Session`] if autologin is rejected
    pub async fn run(self) -> Result<(), ClientError> {
        let Client {
            handle,
            mut supervisor,
            hooks,
            intervals,
        } = self;

        for hook in hooks {
            supervisor.register(hook);
        }
        for hook in intervals {
            tokio::spawn(run_interval(
                hook,
                handle.clone(),
                supervisor.state(),
                supervisor.shutdown_signal(),
                handle.diagnostics_sender(),
            ));
        }

        supervisor.run().await
    }
}

impl<C, E> std::fmt::Debug for Client<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("hooks", &self.hooks.len())
            .field("intervals", &self.intervals.len())
            .finish_non_exhaustive()
    }
}
