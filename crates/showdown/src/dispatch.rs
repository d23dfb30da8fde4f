//! Event fan-out to hooks.
//!
//! Every registered hook owns a worker task fed by an unbounded queue.
//! Dispatching only pushes onto queues, so the reader task never waits on
//! a handler. A worker runs its deliveries one after another, in arrival
//! order, each in its own spawned task: a handler that fails or panics is
//! reported and the worker moves on to the next delivery.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::ClientError;
use crate::hooks::{Callback, Context, Event, EventKey, Hook};

/// Capacity of the diagnostics channel. Slow subscribers miss the oldest
/// reports.
pub(crate) const DIAGNOSTICS_CAPACITY: usize = 256;

/// Sender side of the diagnostics channel.
pub(crate) type Diagnostics = broadcast::Sender<Arc<ClientError>>;

/// Logs a non-fatal error and publishes it to diagnostics subscribers.
pub(crate) fn report(diagnostics: &Diagnostics, err: ClientError) {
    tracing::warn!(error = %err, "client error");
    // No subscribers is fine.
    let _ = diagnostics.send(Arc::new(err));
}

struct Delivery {
    event: Event,
    ctx: Context,
}

struct Registration {
    key: EventKey,
    once: bool,
    after_login: bool,
    name: Arc<str>,
    queue: mpsc::UnboundedSender<Delivery>,
    spent: bool,
}

/// Routes events to hook workers.
pub(crate) struct Dispatcher {
    registrations: Vec<Registration>,
    diagnostics: Diagnostics,
}

impl Dispatcher {
    pub(crate) fn new(diagnostics: Diagnostics) -> Self {
        Self {
            registrations: Vec::new(),
            diagnostics,
        }
    }

    /// Adds a hook and starts its worker.
    pub(crate) fn register(&mut self, hook: Hook) {
        let Hook {
            key,
            callback,
            once,
            after_login,
            name,
        } = hook;
        let name: Arc<str> = name.into();
        let (queue, deliveries) = mpsc::unbounded_channel();

        tokio::spawn(worker(
            Arc::clone(&name),
            callback,
            deliveries,
            self.diagnostics.clone(),
        ));
        tracing::debug!(hook = %name, ?key, once, after_login, "hook registered");

        self.registrations.push(Registration {
            key,
            once,
            after_login,
            name,
            queue,
            spent: false,
        });
    }

    #[cfg(test)]
    /// Number of live registrations.
    pub(crate) fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Queues `events` for every matching hook.
    ///
    /// Within one call, hooks see the events in the order given. For an
    /// [`Event::Message`], hooks registered for its exact type are queued
    /// before [`EventKey::Any`] hooks.
    pub(crate) fn dispatch(&mut self, events: Vec<Event>, ctx: &Context) {
        let logged_in = ctx.session().is_authenticated();

        for event in events {
            let key = event.key();
            let catch_all = matches!(event, Event::Message(_));
            self.deliver(&key, &event, ctx, logged_in);
            if catch_all {
                self.deliver(&EventKey::Any, &event, ctx, logged_in);
            }
        }

        self.registrations.retain(|reg| {
            if reg.spent {
                tracing::debug!(hook = %reg.name, "hook removed");
            }
            !reg.spent
        });
    }

    fn deliver(&mut self, key: &EventKey, event: &Event, ctx: &Context, logged_in: bool) {
        let matching = self
            .registrations
            .iter_mut()
            .filter(|reg| !reg.spent && reg.key == *key);

        for reg in matching {
            if reg.after_login && !logged_in {
                continue;
            }
            let delivery = Delivery {
                event: event.clone(),
                ctx: ctx.clone(),
            };
            if reg.queue.send(delivery).is_err() {
                tracing::warn!(hook = %reg.name, "hook worker is gone");
                reg.spent = true;
                continue;
            }
            if reg.once {
                reg.spent = true;
            }
        }
    }
}

async fn worker(
    name: Arc<str>,
    callback: Callback,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
    diagnostics: Diagnostics,
) {
    while let Some(Delivery { event, ctx }) = deliveries.recv().await {
        let callback = Arc::clone(&callback);
        let run = tokio::spawn(async move { callback(event, ctx).await });

        let message = match run.await {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(err) if err.is_panic() => "handler panicked".to_owned(),
            Err(_) => "handler was cancelled".to_owned(),
        };
        report(
            &diagnostics,
            ClientError::Handler {
                handler: name.to_string(),
                message,
            },
        );
    }
    tracing::trace!(hook = %name, "hook worker finished");
}
