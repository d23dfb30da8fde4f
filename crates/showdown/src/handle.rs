//! The cloneable handle applications and handlers drive the client with.

use std::sync::Arc;

use serde_json::Value;
use showdown_protocol::{ChatMessage, RoomId, outbound};
use showdown_room::{Room, Rooms};
use showdown_session::{Credentials, Session};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::ClientError;
use crate::hooks::{Hook, Snapshot};
use crate::outbox::{Outgoing, SendOptions};
use crate::query::{Query, QueryResult};

/// Requests the reader task handles.
pub(crate) enum Command {
    Query {
        query: Query,
        reply: oneshot::Sender<QueryResult>,
    },
    Login {
        credentials: Credentials,
        reply: oneshot::Sender<Result<Session, ClientError>>,
    },
    Hook {
        hook: Hook,
        registered: oneshot::Sender<()>,
    },
    Close,
}

/// Handle to a running [`Client`](crate::Client).
///
/// Cheap to clone. Sending only queues the line; the client's writer
/// sends queued lines in order once a connection is up.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    snapshot: watch::Receiver<Snapshot>,
    diagnostics: broadcast::Sender<Arc<ClientError>>,
    strict_length: bool,
}

impl ClientHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        outgoing: mpsc::UnboundedSender<Outgoing>,
        snapshot: watch::Receiver<Snapshot>,
        diagnostics: broadcast::Sender<Arc<ClientError>>,
        strict_length: bool,
    ) -> Self {
        Self {
            commands,
            outgoing,
            snapshot,
            diagnostics,
            strict_length,
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Queues a raw protocol line (`ROOM|TEXT`).
    pub fn send(&self, line: impl Into<String>) -> Result<(), ClientError> {
        self.send_with(line, SendOptions::default())
    }

    /// Queues a raw protocol line with a delay and/or lifespan.
    pub fn send_with(&self, line: impl Into<String>, options: SendOptions) -> Result<(), ClientError> {
        self.outgoing
            .send(Outgoing::new(line.into(), options))
            .map_err(|_| ClientError::Closed)
    }

    /// Asks the server to join `room`. The room is tracked once the server
    /// opens it.
    pub fn join(&self, room: &str) -> Result<(), ClientError> {
        self.send(outbound::join(room))
    }

    /// Asks the server to leave `room`.
    pub fn leave(&self, room: &RoomId) -> Result<(), ClientError> {
        self.send(outbound::leave(room))
    }

    /// Says `content` in `room`.
    ///
    /// # Errors
    /// With strict length checking, content over 300 characters is
    /// rejected; otherwise it is truncated.
    pub fn say(&self, room: &RoomId, content: &str) -> Result<(), ClientError> {
        self.send(outbound::reply(room, content, self.strict_length)?)
    }

    /// Answers a chat line in the room it was said in.
    pub fn reply(&self, to: &ChatMessage, content: &str) -> Result<(), ClientError> {
        self.say(&to.room, content)
    }

    /// Sends a private message.
    pub fn private_message(&self, user: &str, content: &str) -> Result<(), ClientError> {
        self.send(outbound::private_message(user, content, self.strict_length)?)
    }

    /// Runs `/command arg, arg` in `room`.
    pub fn use_command(&self, room: &RoomId, command: &str, args: &[&str]) -> Result<(), ClientError> {
        self.send(outbound::command(room, command, args))
    }

    /// Changes the avatar.
    pub fn avatar(&self, id: &str) -> Result<(), ClientError> {
        self.send(outbound::avatar(id))
    }

    /// Saves the replay of a finished battle. The link arrives as a
    /// `savereplay` query response.
    pub fn save_replay(&self, battle: &RoomId) -> Result<(), ClientError> {
        self.send(outbound::save_replay(battle))
    }

    /// Forfeits a battle.
    pub fn forfeit(&self, battle: &RoomId) -> Result<(), ClientError> {
        self.send(outbound::forfeit(battle))
    }

    /// Sets the team (packed format) and searches for a ladder battle.
    pub fn search_battles(&self, team: &str, format: &str) -> Result<(), ClientError> {
        self.send(outbound::upload_team(team))?;
        self.send(outbound::search(format))
    }

    /// Stops searching.
    pub fn cancel_search(&self) -> Result<(), ClientError> {
        self.send(outbound::cancel_search())
    }

    /// Sets the team (packed format) and challenges `user`.
    pub fn challenge(&self, user: &str, team: &str, format: &str) -> Result<(), ClientError> {
        self.send(outbound::upload_team(team))?;
        self.send(outbound::challenge(user, format))
    }

    /// Withdraws the outgoing challenge.
    pub fn cancel_challenge(&self) -> Result<(), ClientError> {
        self.send(outbound::cancel_challenge())
    }

    /// Sets the team (packed format) and accepts `user`'s challenge.
    pub fn accept_challenge(&self, user: &str, team: &str) -> Result<(), ClientError> {
        self.send(outbound::upload_team(team))?;
        self.send(outbound::accept_challenge(user))
    }

    /// Declines `user`'s challenge.
    pub fn reject_challenge(&self, user: &str) -> Result<(), ClientError> {
        self.send(outbound::reject_challenge(user))
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Sends a query and waits for its response.
    ///
    /// # Errors
    /// - [`ClientError::Conflict`] if the same query is already pending
    /// - [`ClientError::Timeout`] if no response arrives in time
    /// - [`ClientError::Disconnected`] / [`ClientError::Closed`] if the
    ///   connection goes away first
    pub async fn query(&self, query: Query) -> Result<Value, ClientError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Query { query, reply })?;
        response.await.map_err(|_| ClientError::Closed)?
    }

    /// Logs in with `credentials` and waits for the server to confirm.
    ///
    /// For clients without autologin. Needs the server's challenge, which
    /// arrives shortly after connecting.
    pub async fn login(&self, credentials: Credentials) -> Result<Session, ClientError> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Login { credentials, reply })?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Registers a hook on the running client.
    ///
    /// Returns once the hook is installed: every message the client reads
    /// after that reaches it.
    pub async fn hook(&self, hook: Hook) -> Result<(), ClientError> {
        let (registered, installed) = oneshot::channel();
        self.command(Command::Hook { hook, registered })?;
        installed.await.map_err(|_| ClientError::Closed)
    }

    /// Stops the client. Pending queries fail with [`ClientError::Closed`].
    pub fn close(&self) {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Close);
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Tracked rooms.
    pub fn rooms(&self) -> Rooms {
        self.snapshot.borrow().rooms.clone()
    }

    /// One tracked room.
    pub fn room(&self, id: &RoomId) -> Option<Room> {
        self.snapshot.borrow().rooms.get(id).cloned()
    }

    /// The login session.
    pub fn session(&self) -> Session {
        self.snapshot.borrow().session.clone()
    }

    /// Whether a connection is up.
    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().connected
    }

    /// The latest state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Waits until the client state satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, ClientError> {
        let mut snapshot = self.snapshot.clone();
        let state = snapshot
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| ClientError::Closed)?;
        Ok(state.clone())
    }

    /// Subscribes to non-fatal errors: decode failures, messages for
    /// unknown rooms, handler failures and query timeouts.
    pub fn diagnostics(&self) -> broadcast::Receiver<Arc<ClientError>> {
        self.diagnostics.subscribe()
    }

    pub(crate) fn diagnostics_sender(&self) -> broadcast::Sender<Arc<ClientError>> {
        self.diagnostics.clone()
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
