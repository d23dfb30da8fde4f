//! Handler registration: events, hooks and the context handlers run with.
//!
//! A [`Hook`] binds an async callback to an [`EventKey`]. Typed
//! constructors ([`Hook::chat_message`], [`Hook::room_init`], ...) unpack
//! the event for the callback; [`Hook::new`] takes the raw [`Event`].
//!
//! ```rust,ignore
//! let greeter = Hook::chat_message(|msg, ctx| async move {
//!     if msg.content == "hi" {
//!         ctx.handle().say(&msg.room, "hello!")?;
//!     }
//!     Ok(())
//! })
//! .after_login()
//! .named("greeter");
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use showdown_interval::IntervalConfig;
use showdown_protocol::{
    ChallengeUpdate, ChatMessage, Message, MessageType, PrivateMessage, QueryResponse, RoomId,
};
use showdown_room::{Room, Rooms};
use showdown_session::Session;

use crate::ClientHandle;

/// Error type handlers return. Anything that converts into it works with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns.
pub type HandlerResult = Result<(), BoxError>;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
pub(crate) type Callback = Arc<dyn Fn(Event, Context) -> BoxFuture + Send + Sync>;
pub(crate) type IntervalCallback = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What a hook listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// The connection is ready.
    Connect,
    /// The server confirmed a login.
    Login,
    /// A room was opened.
    RoomInit,
    /// A room was closed.
    RoomDeinit,
    /// A query response arrived.
    QueryResponse,
    /// A chat line in a room.
    ChatMessage,
    /// A private message.
    PrivateMessage,
    /// The pending challenges changed.
    ChallengeUpdate,
    /// Any message of this type.
    Message(MessageType),
    /// Every message. Runs after the type-specific hooks.
    Any,
}

/// One delivery to a hook.
#[derive(Debug, Clone)]
pub enum Event {
    /// The connection is ready.
    Connect,
    /// The server confirmed a login.
    Login(Session),
    /// A room was opened. Carries the room as just created.
    RoomInit(Room),
    /// A room was closed. Carries its final state.
    RoomDeinit(Room),
    /// A query response arrived.
    QueryResponse(QueryResponse),
    /// A chat line in a room.
    ChatMessage(ChatMessage),
    /// A private message.
    PrivateMessage(PrivateMessage),
    /// The pending challenges changed.
    ChallengeUpdate(ChallengeUpdate),
    /// A decoded message, for type and catch-all hooks.
    Message(Message),
}

impl Event {
    /// The key hooks for this event are registered under.
    ///
    /// [`EventKey::Any`] hooks additionally receive every
    /// [`Event::Message`].
    pub fn key(&self) -> EventKey {
        match self {
            Self::Connect => EventKey::Connect,
            Self::Login(_) => EventKey::Login,
            Self::RoomInit(_) => EventKey::RoomInit,
            Self::RoomDeinit(_) => EventKey::RoomDeinit,
            Self::QueryResponse(_) => EventKey::QueryResponse,
            Self::ChatMessage(_) => EventKey::ChatMessage,
            Self::PrivateMessage(_) => EventKey::PrivateMessage,
            Self::ChallengeUpdate(_) => EventKey::ChallengeUpdate,
            Self::Message(msg) => EventKey::Message(msg.kind().clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Client state at one point in time.
///
/// Cloning is cheap: rooms are a persistent map.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Every tracked room.
    pub rooms: Rooms,
    /// The login session.
    pub session: Session,
    /// Whether a connection is up.
    pub connected: bool,
}

/// What a handler runs with: a handle to act through and the state right
/// after the message that triggered it was applied.
#[derive(Clone)]
pub struct Context {
    handle: ClientHandle,
    snapshot: Snapshot,
}

impl Context {
    pub(crate) fn new(handle: ClientHandle, snapshot: Snapshot) -> Self {
        Self { handle, snapshot }
    }

    /// Handle for sending and querying.
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Tracked rooms.
    pub fn rooms(&self) -> &Rooms {
        &self.snapshot.rooms
    }

    /// One tracked room.
    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.snapshot.rooms.get(id)
    }

    /// The login session.
    pub fn session(&self) -> &Session {
        &self.snapshot.session
    }

    /// The full snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("rooms", &self.snapshot.rooms.len())
            .field("session", &self.snapshot.session)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// An event handler registration.
pub struct Hook {
    pub(crate) key: EventKey,
    pub(crate) callback: Callback,
    pub(crate) once: bool,
    pub(crate) after_login: bool,
    pub(crate) name: String,
}

impl Hook {
    /// A hook receiving raw events for `key`.
    pub fn new<F, Fut>(key: EventKey, callback: F) -> Self
    where
        F: Fn(Event, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = format!("{key:?}");
        Self {
            key,
            callback: Arc::new(move |event: Event, ctx: Context| -> BoxFuture {
                Box::pin(callback(event, ctx))
            }),
            once: false,
            after_login: false,
            name,
        }
    }

    /// Removes the hook after its first delivery.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Skips deliveries while not logged in.
    pub fn after_login(mut self) -> Self {
        self.after_login = true;
        self
    }

    /// Names the hook in logs and [`ClientError::Handler`](crate::ClientError::Handler).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The key the hook is registered under.
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// The hook's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs when the connection is ready, after every (re)connect.
    pub fn connect<F, Fut>(callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let callback = Arc::new(callback);
        Self::new(EventKey::Connect, move |_, ctx| {
            let callback = Arc::clone(&callback);
            async move { callback(ctx).await }
        })
    }

    /// Runs when the server confirms a login.
    pub fn login<F, Fut>(callback: F) -> Self
    where
        F: Fn(Session, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::Login, login_of, callback)
    }

    /// Runs when a room is opened.
    pub fn room_init<F, Fut>(callback: F) -> Self
    where
        F: Fn(Room, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::RoomInit, room_init_of, callback)
    }

    /// Runs when a room is closed.
    pub fn room_deinit<F, Fut>(callback: F) -> Self
    where
        F: Fn(Room, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::RoomDeinit, room_deinit_of, callback)
    }

    /// Runs for every query response, awaited or not.
    pub fn query_response<F, Fut>(callback: F) -> Self
    where
        F: Fn(QueryResponse, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::QueryResponse, query_response_of, callback)
    }

    /// Runs for every chat line.
    pub fn chat_message<F, Fut>(callback: F) -> Self
    where
        F: Fn(ChatMessage, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::ChatMessage, chat_message_of, callback)
    }

    /// Runs for every private message, sent or received.
    pub fn private_message<F, Fut>(callback: F) -> Self
    where
        F: Fn(PrivateMessage, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::PrivateMessage, private_message_of, callback)
    }

    /// Runs when the pending challenges change.
    pub fn challenge_update<F, Fut>(callback: F) -> Self
    where
        F: Fn(ChallengeUpdate, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::ChallengeUpdate, challenge_update_of, callback)
    }

    /// Runs for every message of type `kind`.
    pub fn message<F, Fut>(kind: MessageType, callback: F) -> Self
    where
        F: Fn(Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::Message(kind), message_of, callback)
    }

    /// Runs for every message, after the type-specific hooks.
    pub fn any<F, Fut>(callback: F) -> Self
    where
        F: Fn(Message, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        typed(EventKey::Any, message_of, callback)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("once", &self.once)
            .field("after_login", &self.after_login)
            .finish_non_exhaustive()
    }
}

fn typed<T, F, Fut>(key: EventKey, extract: fn(Event) -> Option<T>, callback: F) -> Hook
where
    T: Send + 'static,
    F: Fn(T, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let callback = Arc::new(callback);
    Hook::new(key, move |event, ctx| {
        let callback = Arc::clone(&callback);
        async move {
            match extract(event) {
                Some(value) => callback(value, ctx).await,
                None => Ok(()),
            }
        }
    })
}

fn login_of(event: Event) -> Option<Session> {
    match event {
        Event::Login(session) => Some(session),
        _ => None,
    }
}

fn room_init_of(event: Event) -> Option<Room> {
    match event {
        Event::RoomInit(room) => Some(room),
        _ => None,
    }
}

fn room_deinit_of(event: Event) -> Option<Room> {
    match event {
        Event::RoomDeinit(room) => Some(room),
        _ => None,
    }
}

fn query_response_of(event: Event) -> Option<QueryResponse> {
    match event {
        Event::QueryResponse(response) => Some(response),
        _ => None,
    }
}

fn chat_message_of(event: Event) -> Option<ChatMessage> {
    match event {
        Event::ChatMessage(msg) => Some(msg),
        _ => None,
    }
}

fn private_message_of(event: Event) -> Option<PrivateMessage> {
    match event {
        Event::PrivateMessage(msg) => Some(msg),
        _ => None,
    }
}

fn challenge_update_of(event: Event) -> Option<ChallengeUpdate> {
    match event {
        Event::ChallengeUpdate(update) => Some(update),
        _ => None,
    }
}

fn message_of(event: Event) -> Option<Message> {
    match event {
        Event::Message(msg) => Some(msg),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// IntervalHook
// ---------------------------------------------------------------------------

/// A handler that runs periodically while the client is connected.
///
/// Runs of one interval hook never overlap. The first run comes as soon as
/// the connection is up (plus any configured initial delay); while the
/// connection is down the hook is paused, and after a reconnect the next
/// run is one full period away.
pub struct IntervalHook {
    pub(crate) config: IntervalConfig,
    pub(crate) callback: IntervalCallback,
    pub(crate) after_login: bool,
    pub(crate) name: String,
}

impl IntervalHook {
    /// Runs `callback` every `period`. A zero period never runs.
    pub fn new<F, Fut>(period: Duration, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::with_config(IntervalConfig::every(period), callback)
    }

    /// Runs `callback` on the schedule `config` describes.
    pub fn with_config<F, Fut>(config: IntervalConfig, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = format!("every {:?}", config.period);
        Self {
            config,
            callback: Arc::new(move |ctx: Context| -> BoxFuture { Box::pin(callback(ctx)) }),
            after_login: false,
            name,
        }
    }

    /// Only runs while logged in.
    pub fn after_login(mut self) -> Self {
        self.after_login = true;
        self
    }

    /// Names the hook in logs and errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for IntervalHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalHook")
            .field("name", &self.name)
            .field("period", &self.config.period)
            .field("after_login", &self.after_login)
            .finish_non_exhaustive()
    }
}
