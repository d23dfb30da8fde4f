//! The outbound queue and the writer task that drains it.
//!
//! Every line the client sends, from handlers and from the reader task
//! alike, goes through one FIFO queue. A writer task per connection takes
//! lines off the queue in order, drops the ones whose lifespan ran out,
//! frames the rest and sends them, pausing for the configured throttle
//! after each one. A line that is not due yet is set aside until it is,
//! and the lines behind it keep flowing.
//!
//! The queue outlives connections: lines queued while disconnected are
//! sent once the next connection is up, unless they expired meanwhile.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use showdown_protocol::Framing;
use showdown_transport::Connection;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{self, Instant};

/// Scheduling options for an outbound line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Do not send before this much time has passed.
    pub delay: Duration,
    /// Discard the line if it could not be sent within this much time.
    /// `None` never discards.
    pub lifespan: Option<Duration>,
}

impl SendOptions {
    /// Sends after `delay`.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            lifespan: None,
        }
    }

    /// Discards the line after `lifespan`.
    pub fn expiring(lifespan: Duration) -> Self {
        Self {
            delay: Duration::ZERO,
            lifespan: Some(lifespan),
        }
    }
}

/// One queued line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Outgoing {
    pub(crate) line: String,
    pub(crate) not_before: Instant,
    pub(crate) expires_at: Option<Instant>,
}

impl Outgoing {
    pub(crate) fn new(line: String, options: SendOptions) -> Self {
        let now = Instant::now();
        Self {
            line,
            not_before: now + options.delay,
            expires_at: options.lifespan.map(|lifespan| now + lifespan),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A line set aside until it is due. Earliest first, then in the order
/// the lines were set aside.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deferred {
    not_before: Instant,
    seq: u64,
    line: Outgoing,
}

/// The receiving end of the queue, shared by successive writers.
pub(crate) struct Outbox {
    rx: mpsc::UnboundedReceiver<Outgoing>,
    deferred: BinaryHeap<Reverse<Deferred>>,
    seq: u64,
}

impl Outbox {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Outgoing>) -> Self {
        Self {
            rx,
            deferred: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Sets `line` aside until its `not_before`.
    fn defer(&mut self, line: Outgoing) {
        self.seq += 1;
        self.deferred.push(Reverse(Deferred {
            not_before: line.not_before,
            seq: self.seq,
            line,
        }));
    }

    /// Takes the earliest set-aside line if it is due at `now`.
    fn pop_due(&mut self, now: Instant) -> Option<Outgoing> {
        let due = self
            .deferred
            .peek()
            .is_some_and(|Reverse(next)| next.not_before <= now);
        if !due {
            return None;
        }
        self.deferred.pop().map(|Reverse(next)| next.line)
    }

    /// When the earliest set-aside line becomes due.
    fn next_due(&self) -> Option<Instant> {
        self.deferred.peek().map(|Reverse(next)| next.not_before)
    }
}

/// Drains the outbox onto `conn` until `stop` fires, the queue closes or a
/// send fails.
pub(crate) async fn write_loop<T: Connection>(
    conn: Arc<T>,
    outbox: Arc<Mutex<Outbox>>,
    framing: Framing,
    throttle: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let conn_id = conn.id();
    let mut outbox = outbox.lock().await;
    tracing::debug!(%conn_id, "writer started");

    loop {
        let next = match outbox.pop_due(Instant::now()) {
            Some(next) => next,
            None => {
                let wake = outbox.next_due();
                tokio::select! {
                    _ = &mut stop => break,
                    next = outbox.rx.recv() => match next {
                        Some(next) => next,
                        None => break,
                    },
                    _ = sleep_until(wake) => continue,
                }
            }
        };

        let now = Instant::now();
        if next.is_expired(now) {
            tracing::debug!(line = %next.line, "discarding expired line");
            continue;
        }
        if next.not_before > now {
            outbox.defer(next);
            continue;
        }

        let frame = match framing.wrap(&next.line) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, line = %next.line, "dropping unframeable line");
                continue;
            }
        };
        if let Err(err) = conn.send(&frame).await {
            tracing::debug!(%conn_id, error = %err, "send failed, keeping line for the next connection");
            outbox.defer(next);
            break;
        }
        tracing::trace!(%conn_id, line = %next.line, "sent");

        if !throttle.is_zero() {
            tokio::select! {
                _ = &mut stop => break,
                _ = time::sleep(throttle) => {}
            }
        }
    }

    tracing::debug!(%conn_id, "writer stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
