//! The connection supervisor: connect, read, apply, dispatch, reconnect.
//!
//! One task owns every piece of mutable client state (rooms, login
//! handshake, pending queries, hook registrations) and is the only one
//! that touches it. Per connection it runs a `select!` loop over:
//!
//! - inbound frames, unwrapped, decoded and applied in order
//! - commands from [`ClientHandle`]s (queries, logins, hooks, close)
//! - results of credential exchanges running in their own tasks
//! - the earliest query deadline
//!
//! Outbound lines never pass through here; a writer task per connection
//! drains the shared outbox.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use showdown_protocol::{
    ChallengeUpdate, ChatMessage, Frame, Message, MessageType, PrivateMessage, ProtocolError,
    QueryResponse, decode,
};
use showdown_room::{RoomChange, RoomRegistry};
use showdown_session::{AuthAction, AuthManager, CredentialExchange, CredentialRequest, Session, SessionError};
use showdown_transport::{Connection, Connector, TransportError};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::ClientConfig;
use crate::dispatch::{Diagnostics, Dispatcher, report};
use crate::handle::Command;
use crate::hooks::{Context, Event, Hook, Snapshot};
use crate::outbox::{Outbox, write_loop};
use crate::query::QueryCorrelator;
use crate::{ClientError, ClientHandle};

type LoginWaiter = oneshot::Sender<Result<Session, ClientError>>;
type ExchangeResult = (u64, Result<String, SessionError>);

/// Why a connection ended.
enum Exit {
    /// The application closed the client.
    Closed,
    /// The connection dropped. Eligible for reconnect.
    Lost(ClientError),
    /// Reconnecting cannot help.
    Fatal(ClientError),
}

enum Step {
    Frame(Result<Option<String>, TransportError>),
    Command(Option<Command>),
    Exchange(Option<ExchangeResult>),
    Deadline,
}

/// One live connection and its writer.
struct Link<T> {
    conn: Arc<T>,
    writer: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

pub(crate) struct Supervisor<C, E> {
    connector: C,
    exchange: Arc<E>,
    config: ClientConfig,
    handle: ClientHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    outbox: Arc<Mutex<Outbox>>,
    state: watch::Sender<Snapshot>,
    shutdown: watch::Sender<bool>,
    diagnostics: Diagnostics,
    rooms: RoomRegistry,
    auth: AuthManager,
    queries: QueryCorrelator,
    dispatcher: Dispatcher,
    login_waiters: Vec<LoginWaiter>,
    exchange_tx: mpsc::UnboundedSender<ExchangeResult>,
    exchange_rx: mpsc::UnboundedReceiver<ExchangeResult>,
    /// Bumped per connection.
    generation: u64,
    /// Bumped per credential exchange.
    exchange_seq: u64,
    /// The exchange whose result is still wanted. Results of any other
    /// exchange are dropped.
    exchange_pending: Option<u64>,
    connected: bool,
}

pub(crate) struct Parts<C, E> {
    pub(crate) connector: C,
    pub(crate) exchange: E,
    pub(crate) config: ClientConfig,
    pub(crate) handle: ClientHandle,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) outbox: Outbox,
    pub(crate) state: watch::Sender<Snapshot>,
    pub(crate) diagnostics: Diagnostics,
}

impl<C, E> Supervisor<C, E>
where
    C: Connector,
    E: CredentialExchange,
{
    pub(crate) fn new(parts: Parts<C, E>) -> Self {
        let Parts {
            connector,
            exchange,
            config,
            handle,
            commands,
            outbox,
            state,
            diagnostics,
        } = parts;
        let (exchange_tx, exchange_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            connector,
            exchange: Arc::new(exchange),
            rooms: RoomRegistry::new(config.rooms.clone()),
            auth: AuthManager::new(config.session.clone()),
            config,
            handle,
            commands,
            outbox: Arc::new(Mutex::new(outbox)),
            state,
            shutdown,
            dispatcher: Dispatcher::new(diagnostics.clone()),
            diagnostics,
            queries: QueryCorrelator::new(),
            login_waiters: Vec::new(),
            exchange_tx,
            exchange_rx,
            generation: 0,
            exchange_seq: 0,
            exchange_pending: None,
            connected: false,
        }
    }

    /// Receiver interval tasks stop on.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Receiver interval tasks read client state from.
    pub(crate) fn state(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Adds a hook registered before the client started.
    pub(crate) fn register(&mut self, hook: Hook) {
        self.dispatcher.register(hook);
    }

    /// Runs until the client is closed or gives up.
    pub(crate) async fn run(mut self) -> Result<(), ClientError> {
        let result = self.supervise().await;
        self.stop();
        match &result {
            Ok(()) => tracing::info!("client closed"),
            Err(err) => tracing::error!(error = %err, "client stopped"),
        }
        result
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    async fn supervise(&mut self) -> Result<(), ClientError> {
        let mut attempt: u32 = 0;

        loop {
            let url = self.config.server.connect_url();
            tracing::info!(%url, attempt, "connecting");

            let connecting = self.connector.connect(&url);
            let Some(connected) =
                while_offline(&mut self.commands, &mut self.dispatcher, connecting).await
            else {
                return Ok(());
            };

            let err = match connected {
                Ok(conn) => {
                    attempt = 0;
                    match self.serve(conn).await {
                        Exit::Closed => return Ok(()),
                        Exit::Fatal(err) => return Err(err),
                        Exit::Lost(err) => err,
                    }
                }
                Err(err) => {
                    tracing::warn!(%url, error = %err, "connect failed");
                    ClientError::from(err)
                }
            };

            let Some(policy) = &self.config.reconnect else {
                return Err(err);
            };
            let Some(delay) = policy.delay(attempt) else {
                tracing::error!(attempts = attempt, "giving up reconnecting");
                return Err(err);
            };
            attempt += 1;
            tracing::info!(
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "reconnecting"
            );

            let backoff = time::sleep(delay);
            if while_offline(&mut self.commands, &mut self.dispatcher, backoff)
                .await
                .is_none()
            {
                return Ok(());
            }
        }
    }

    async fn serve(&mut self, conn: C::Connection) -> Exit {
        self.generation += 1;
        let mut link = Link {
            conn: Arc::new(conn),
            writer: None,
        };
        let conn_id = link.conn.id();
        tracing::info!(%conn_id, generation = self.generation, "connected");

        if !self.config.server.framing.announces_open() {
            self.ready(&mut link);
        }
        let exit = self.read_loop(&mut link).await;

        if let Some((stop, writer)) = link.writer.take() {
            let _ = stop.send(());
            if let Err(err) = writer.await {
                tracing::warn!(%conn_id, error = %err, "writer task failed");
            }
        }
        if let Err(err) = link.conn.close().await {
            tracing::debug!(%conn_id, error = %err, "close failed");
        }
        self.disconnected(matches!(exit, Exit::Closed));
        tracing::info!(%conn_id, "disconnected");
        exit
    }

    /// The session is usable: start writing and fire `Connect`.
    fn ready(&mut self, link: &mut Link<C::Connection>) {
        if link.writer.is_some() {
            return;
        }
        let (stop, stopped) = oneshot::channel();
        let writer = tokio::spawn(write_loop(
            Arc::clone(&link.conn),
            Arc::clone(&self.outbox),
            self.config.server.framing,
            self.config.send_throttle,
            stopped,
        ));
        link.writer = Some((stop, writer));

        self.connected = true;
        let snapshot = self.publish();
        self.dispatch(vec![Event::Connect], snapshot);
    }

    /// Resets per-connection state after a connection ended.
    fn disconnected(&mut self, closed: bool) {
        let err = move || {
            if closed {
                ClientError::Closed
            } else {
                ClientError::Disconnected
            }
        };

        self.rooms.clear();
        self.auth.reset();
        self.exchange_pending = None;
        let failed = self.queries.fail_all(err);
        if failed > 0 {
            tracing::debug!(failed, "failed pending queries");
        }
        for waiter in self.login_waiters.drain(..) {
            let _ = waiter.send(Err(err()));
        }
        self.connected = false;
        self.publish();
    }

    /// Final cleanup once the client stops for good.
    fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        self.queries.fail_all(|| ClientError::Closed);
        for waiter in self.login_waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::Closed));
        }
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            reject(command, ClientError::Closed);
        }
    }

    // -----------------------------------------------------------------------
    // Reader loop
    // -----------------------------------------------------------------------

    async fn read_loop(&mut self, link: &mut Link<C::Connection>) -> Exit {
        loop {
            let deadline = self.queries.next_deadline();
            let step = tokio::select! {
                frame = link.conn.recv() => Step::Frame(frame),
                command = self.commands.recv() => Step::Command(command),
                result = self.exchange_rx.recv() => Step::Exchange(result),
                _ = sleep_until(deadline) => Step::Deadline,
            };

            let exit = match step {
                Step::Frame(Ok(Some(frame))) => self.on_frame(link, &frame),
                Step::Frame(Ok(None)) => {
                    tracing::info!("server closed the connection");
                    Some(Exit::Lost(ClientError::Disconnected))
                }
                Step::Frame(Err(err)) => Some(Exit::Lost(err.into())),
                Step::Command(Some(command)) => self.on_command(command),
                Step::Command(None) => Some(Exit::Closed),
                Step::Exchange(Some((exchange, result))) => self.on_exchange(exchange, result),
                Step::Exchange(None) => None,
                Step::Deadline => {
                    self.expire_queries();
                    None
                }
            };
            if let Some(exit) = exit {
                return exit;
            }
        }
    }

    fn on_frame(&mut self, link: &mut Link<C::Connection>, frame: &str) -> Option<Exit> {
        tracing::trace!(frame, "frame received");
        match self.config.server.framing.unwrap_frame(frame) {
            Ok(Frame::Open) => {
                self.ready(link);
                None
            }
            Ok(Frame::Heartbeat) => None,
            Ok(Frame::Payloads(payloads)) => {
                for payload in payloads {
                    if let Some(exit) = self.on_payload(&payload) {
                        return Some(exit);
                    }
                }
                None
            }
            Ok(Frame::Close { code, reason }) => {
                tracing::info!(code, %reason, "server is closing the session");
                Some(Exit::Lost(ClientError::Disconnected))
            }
            Err(err) => {
                report(&self.diagnostics, err.into());
                None
            }
        }
    }

    fn on_payload(&mut self, payload: &str) -> Option<Exit> {
        let mut exit = None;
        for decoded in decode(payload) {
            match decoded {
                Ok(msg) => {
                    if let Some(fatal) = self.on_message(msg) {
                        exit.get_or_insert(fatal);
                    }
                }
                Err(err) => report(&self.diagnostics, err.into()),
            }
        }
        exit
    }

    /// Applies one message to client state, then hands it to hooks.
    fn on_message(&mut self, msg: Message) -> Option<Exit> {
        tracing::debug!(room = %msg.room(), kind = ?msg.kind(), "message");
        let mut events = Vec::new();

        match self.rooms.on_message(&msg) {
            Ok(RoomChange::Created(id)) => {
                if let Some(room) = self.rooms.get(&id) {
                    events.push(Event::RoomInit(room.clone()));
                }
            }
            Ok(RoomChange::Removed(room)) => events.push(Event::RoomDeinit(room)),
            Ok(RoomChange::Updated(_) | RoomChange::Ignored) => {}
            Err(err) => report(&self.diagnostics, err.into()),
        }

        if let Err(err) = self.derive_events(&msg, &mut events) {
            report(&self.diagnostics, err);
        }

        let exit = match self.auth.on_message(&msg) {
            Some(action) => self.on_auth_action(action, &mut events),
            None => None,
        };

        events.push(Event::Message(msg));
        let snapshot = self.publish();
        self.dispatch(events, snapshot);
        exit
    }

    /// Typed events for the messages the client interprets.
    fn derive_events(&mut self, msg: &Message, events: &mut Vec<Event>) -> Result<(), ClientError> {
        match msg.kind() {
            MessageType::QueryResponse => {
                let response = QueryResponse::from_message(msg)?;
                if self.queries.resolve(&response).is_none() {
                    let payload = msg.param(1).unwrap_or("null");
                    match serde_json::from_str::<Value>(payload) {
                        Ok(_) => {
                            tracing::debug!(kind = %response.kind, "unsolicited query response");
                        }
                        // Keyed queries cannot match an unreadable payload.
                        Err(err) => {
                            let unreadable = ProtocolError::Decode {
                                record: msg.line().to_owned(),
                                reason: err.to_string(),
                            };
                            self.queries.reject(&response.kind, unreadable.into());
                        }
                    }
                }
                if response.kind == "savereplay" {
                    self.upload_replay(response.data.clone());
                }
                events.push(Event::QueryResponse(response));
            }
            MessageType::Chat | MessageType::TimestampedChat => {
                events.push(Event::ChatMessage(ChatMessage::from_message(msg)?));
            }
            MessageType::Pm => {
                events.push(Event::PrivateMessage(PrivateMessage::from_message(msg)?));
            }
            MessageType::UpdateChallenges => {
                events.push(Event::ChallengeUpdate(ChallengeUpdate::from_message(msg)?));
            }
            _ => {}
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    fn on_auth_action(&mut self, action: AuthAction, events: &mut Vec<Event>) -> Option<Exit> {
        match action {
            AuthAction::Exchange(request) => {
                self.start_exchange(request);
                None
            }
            AuthAction::LoggedIn(session) => {
                for waiter in self.login_waiters.drain(..) {
                    let _ = waiter.send(Ok(session.clone()));
                }
                events.push(Event::Login(session));
                None
            }
            AuthAction::Failed(err) => self.login_failed(err),
        }
    }

    fn start_exchange(&mut self, request: CredentialRequest) {
        self.exchange_seq += 1;
        let id = self.exchange_seq;
        self.exchange_pending = Some(id);

        let exchange = Arc::clone(&self.exchange);
        let results = self.exchange_tx.clone();
        tracing::debug!(username = %request.username, exchange = id, "running credential exchange");

        tokio::spawn(async move {
            let result = exchange.exchange(request).await;
            // The client may have stopped meanwhile.
            let _ = results.send((id, result));
        });
    }

    fn on_exchange(&mut self, id: u64, result: Result<String, SessionError>) -> Option<Exit> {
        let wanted = self.exchange_pending == Some(id);
        if wanted {
            self.exchange_pending = None;
        }
        // Only the latest exchange of a login still in progress counts.
        if !wanted || !self.auth.is_exchanging() {
            tracing::debug!(exchange = id, "ignoring stale exchange result");
            return None;
        }

        let submitted = result.and_then(|assertion| self.auth.submit(&assertion));
        let exit = match submitted {
            Ok(line) => {
                self.enqueue(line);
                None
            }
            Err(err) => match self.auth.exchange_failed(err) {
                AuthAction::Failed(err) => self.login_failed(err),
                _ => None,
            },
        };
        self.publish();
        exit
    }

    /// Fails manual logins, or the whole client if autologin failed.
    fn login_failed(&mut self, err: SessionError) -> Option<Exit> {
        self.exchange_pending = None;
        if !self.login_waiters.is_empty() {
            for waiter in self.login_waiters.drain(..) {
                let _ = waiter.send(Err(err.clone().into()));
            }
            return None;
        }
        if self.config.session.autologin {
            return Some(Exit::Fatal(err.into()));
        }
        report(&self.diagnostics, err.into());
        None
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn on_command(&mut self, command: Command) -> Option<Exit> {
        match command {
            Command::Query { query, reply } => {
                let key = query.key();
                let issued =
                    self.queries
                        .issue(key.clone(), reply, Instant::now(), self.config.query_timeout);
                match issued {
                    Ok(request_id) => {
                        tracing::debug!(%key, request_id, "query issued");
                        self.enqueue(query.line());
                    }
                    Err(err) => tracing::debug!(%key, error = %err, "query rejected"),
                }
                None
            }
            Command::Login { credentials, reply } => {
                match self.auth.login(&credentials) {
                    Ok(request) => {
                        self.login_waiters.push(reply);
                        self.start_exchange(request);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err.into()));
                    }
                }
                None
            }
            Command::Hook { hook, registered } => {
                self.dispatcher.register(hook);
                let _ = registered.send(());
                None
            }
            Command::Close => {
                tracing::info!("close requested");
                Some(Exit::Closed)
            }
        }
    }

    /// Hands a `savereplay` payload to the endpoint in its own task.
    fn upload_replay(&self, replay: Value) {
        let exchange = Arc::clone(&self.exchange);
        let diagnostics = self.diagnostics.clone();
        tracing::debug!(replay = %replay["id"], "uploading replay");

        tokio::spawn(async move {
            match exchange.upload_replay(replay).await {
                Ok(()) => {}
                Err(SessionError::Unsupported(action)) => {
                    tracing::debug!(action, "endpoint cannot store replays");
                }
                Err(err) => report(&diagnostics, err.into()),
            }
        });
    }

    fn expire_queries(&mut self) {
        for (key, timeout) in self.queries.expire(Instant::now()) {
            tracing::debug!(%key, "query expired");
            report(&self.diagnostics, ClientError::Timeout(timeout));
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enqueue(&self, line: String) {
        if let Err(err) = self.handle.send(line) {
            tracing::warn!(error = %err, "outbox closed");
        }
    }

    /// Publishes the current state and returns it.
    fn publish(&self) -> Snapshot {
        let snapshot = Snapshot {
            rooms: self.rooms.snapshot(),
            session: self.auth.session().clone(),
            connected: self.connected,
        };
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    fn dispatch(&mut self, events: Vec<Event>, snapshot: Snapshot) {
        let ctx = Context::new(self.handle.clone(), snapshot);
        self.dispatcher.dispatch(events, &ctx);
    }
}

/// Drives `fut` while no connection is up, answering commands meanwhile.
///
/// Returns `None` if the client was closed first.
async fn while_offline<F: Future>(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    dispatcher: &mut Dispatcher,
    fut: F,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            output = &mut fut => return Some(output),
            command = commands.recv() => match command {
                Some(Command::Close) | None => return None,
                Some(Command::Hook { hook, registered }) => {
                    dispatcher.register(hook);
                    let _ = registered.send(());
                }
                Some(command) => reject(command, ClientError::Disconnected),
            },
        }
    }
}

/// Answers a command that cannot be served.
fn reject(command: Command, err: ClientError) {
    match command {
        Command::Query { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        Command::Login { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        Command::Hook { .. } | Command::Close => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
