//! Query/response correlation.
//!
//! Information queries (`/cmd rooms`, `/cmd userdetails zarel`, ...) are
//! answered by a `queryresponse|TYPE|JSON` message that carries no request
//! id. The correlator pairs responses with their queries by a
//! [`QueryKey`]: the response type, plus the user id embedded in the
//! response where the server echoes one.
//!
//! At most one query per key is outstanding. A second query for the same
//! key fails immediately with [`ClientError::Conflict`] and leaves the
//! first one alone.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use showdown_protocol::{QueryResponse, outbound, to_id};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::ClientError;

/// What a query resolves to.
pub type QueryResult = Result<Value, ClientError>;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// An information query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Public chat rooms (`/cmd rooms`).
    Rooms,
    /// Public battles, optionally filtered (`/cmd roomlist FORMAT, ELO`).
    RoomList {
        /// Format id, empty for all formats.
        format: String,
        /// Minimum rating.
        min_elo: Option<u32>,
    },
    /// Details about one user (`/cmd userdetails USERID`).
    UserDetails {
        /// User name or id.
        user: String,
    },
    /// Any other `/cmd` query.
    Custom {
        /// Everything after `/cmd `.
        command: String,
        /// Response type the server answers with.
        response: String,
        /// Expected `userid` field of the response, if it carries one.
        key: Option<String>,
    },
}

impl Query {
    /// `/cmd roomlist` for `format`.
    pub fn room_list(format: impl Into<String>, min_elo: Option<u32>) -> Self {
        Self::RoomList {
            format: format.into(),
            min_elo,
        }
    }

    /// `/cmd userdetails` for `user`.
    pub fn user_details(user: impl Into<String>) -> Self {
        Self::UserDetails { user: user.into() }
    }

    /// The key the response will be matched by.
    pub fn key(&self) -> QueryKey {
        match self {
            Self::Rooms => QueryKey::new("rooms", None),
            Self::RoomList { .. } => QueryKey::new("roomlist", None),
            Self::UserDetails { user } => QueryKey::new("userdetails", Some(to_id(user))),
            Self::Custom { response, key, .. } => {
                QueryKey::new(response.clone(), key.as_deref().map(to_id))
            }
        }
    }

    /// The outbound line that sends the query.
    pub fn line(&self) -> String {
        match self {
            Self::Rooms => outbound::query("rooms"),
            Self::RoomList { format, min_elo } => {
                let mut params = format!("roomlist {}", to_id(format));
                if let Some(elo) = min_elo {
                    params.push_str(&format!(", {elo}"));
                }
                outbound::query(&params)
            }
            Self::UserDetails { user } => outbound::query(&format!("userdetails {}", to_id(user))),
            Self::Custom { command, .. } => outbound::query(command),
        }
    }
}

/// Correlation key of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Response type.
    pub kind: String,
    /// Id embedded in the response, if any.
    pub key: Option<String>,
}

impl QueryKey {
    /// Creates a key.
    pub fn new(kind: impl Into<String>, key: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            key,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}:{key}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

struct PendingQuery {
    request_id: u64,
    issued_at: Instant,
    deadline: Instant,
    timeout: Duration,
    awaiter: oneshot::Sender<QueryResult>,
}

/// Outstanding queries, keyed by [`QueryKey`].
///
/// Owned by the client's reader task; callers wait on the receiving half
/// of the awaiter they registered.
#[derive(Default)]
pub struct QueryCorrelator {
    pending: HashMap<QueryKey, PendingQuery>,
    next_id: u64,
}

impl QueryCorrelator {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query and returns its request id.
    ///
    /// # Errors
    /// Returns [`ClientError::Conflict`] if a query with the same key is
    /// outstanding; `awaiter` then receives the same error. A pending query
    /// whose caller has stopped waiting does not count and is replaced.
    pub fn issue(
        &mut self,
        key: QueryKey,
        awaiter: oneshot::Sender<QueryResult>,
        now: Instant,
        timeout: Duration,
    ) -> Result<u64, ClientError> {
        if let Some(existing) = self.pending.get(&key) {
            if !existing.awaiter.is_closed() {
                let _ = awaiter.send(Err(ClientError::Conflict(key.to_string())));
                return Err(ClientError::Conflict(key.to_string()));
            }
            tracing::debug!(%key, request_id = existing.request_id, "replacing abandoned query");
        }

        self.next_id += 1;
        let request_id = self.next_id;
        self.pending.insert(
            key,
            PendingQuery {
                request_id,
                issued_at: now,
                deadline: now + timeout,
                timeout,
                awaiter,
            },
        );
        Ok(request_id)
    }

    /// Delivers a response to its query. Returns the request id it
    /// resolved, if any.
    ///
    /// A response carrying a `userid` resolves the query keyed by that id
    /// first, then a query keyed by type alone.
    pub fn resolve(&mut self, response: &QueryResponse) -> Option<u64> {
        let keyed = response
            .user_id()
            .map(|id| QueryKey::new(response.kind.clone(), Some(id.to_owned())));
        let plain = QueryKey::new(response.kind.clone(), None);

        let (key, pending) = keyed
            .into_iter()
            .chain(std::iter::once(plain))
            .find_map(|key| self.pending.remove(&key).map(|pending| (key, pending)))?;

        tracing::debug!(
            %key,
            request_id = pending.request_id,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "query resolved"
        );
        if pending.awaiter.send(Ok(response.data.clone())).is_err() {
            tracing::debug!(%key, "query caller went away before the response");
        }
        Some(pending.request_id)
    }

    /// Fails the oldest outstanding query of type `kind` with `err`, for a
    /// response whose payload could not be read. Returns its request id.
    pub fn reject(&mut self, kind: &str, err: ClientError) -> Option<u64> {
        let key = self
            .pending
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .min_by_key(|(_, pending)| pending.request_id)
            .map(|(key, _)| key.clone())?;
        let pending = self.pending.remove(&key)?;

        tracing::debug!(%key, request_id = pending.request_id, error = %err, "query failed");
        let _ = pending.awaiter.send(Err(err));
        Some(pending.request_id)
    }

    /// Fails every query whose deadline has passed with
    /// [`ClientError::Timeout`]. Returns the expired keys and timeouts.
    pub fn expire(&mut self, now: Instant) -> Vec<(QueryKey, Duration)> {
        let expired: Vec<QueryKey> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(pending) = self.pending.remove(&key) {
                tracing::warn!(%key, request_id = pending.request_id, "query timed out");
                let _ = pending.awaiter.send(Err(ClientError::Timeout(pending.timeout)));
                out.push((key, pending.timeout));
            }
        }
        out
    }

    /// Fails every outstanding query with the error `err` builds. Returns
    /// how many were failed.
    pub fn fail_all(&mut self, err: impl Fn() -> ClientError) -> usize {
        let count = self.pending.len();
        for (key, pending) in self.pending.drain() {
            tracing::debug!(%key, request_id = pending.request_id, "failing query");
            let _ = pending.awaiter.send(Err(err()));
        }
        count
    }

    /// The earliest deadline among outstanding queries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    /// Whether a query with `key` is outstanding.
    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of outstanding queries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
