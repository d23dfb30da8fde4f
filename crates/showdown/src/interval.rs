//! Runner task for interval hooks.
//!
//! Each [`IntervalHook`] gets one task that watches the client state. The
//! hook's scheduler is created the first time the hook may run (connected,
//! and logged in if the hook asks for it), paused whenever that stops being
//! true and resumed when it is true again.

use showdown_interval::{IntervalScheduler, TickInfo};
use tokio::sync::watch;

use crate::ClientError;
use crate::ClientHandle;
use crate::dispatch::{Diagnostics, report};
use crate::hooks::{Context, IntervalHook, Snapshot};

enum Step {
    Gate,
    Tick(TickInfo),
    Stop,
}

/// Runs `hook` until `shutdown` fires or its sender goes away.
pub(crate) async fn run_interval(
    hook: IntervalHook,
    handle: ClientHandle,
    mut state: watch::Receiver<Snapshot>,
    mut shutdown: watch::Receiver<bool>,
    diagnostics: Diagnostics,
) {
    let IntervalHook {
        config,
        callback,
        after_login,
        name,
    } = hook;
    let mut scheduler: Option<IntervalScheduler> = None;

    loop {
        let open = {
            let snapshot = state.borrow_and_update();
            snapshot.connected && (!after_login || snapshot.session.is_authenticated())
        };
        if let Some(scheduler) = scheduler.as_mut() {
            if open {
                scheduler.resume();
            } else {
                scheduler.pause();
            }
        } else if open {
            tracing::debug!(hook = %name, "interval started");
            scheduler = Some(IntervalScheduler::new(config.clone()));
        }

        let step = tokio::select! {
            _ = shutdown.changed() => Step::Stop,
            changed = state.changed() => match changed {
                Ok(()) => Step::Gate,
                Err(_) => Step::Stop,
            },
            tick = next_tick(scheduler.as_mut()) => Step::Tick(tick),
        };

        let tick = match step {
            Step::Gate => continue,
            Step::Stop => break,
            Step::Tick(tick) => tick,
        };
        tracing::trace!(hook = %name, tick = tick.tick, overrun = tick.overrun, "interval run");

        let ctx = Context::new(handle.clone(), state.borrow().clone());
        let run = tokio::spawn(callback(ctx));
        let abort = run.abort_handle();
        let outcome = tokio::select! {
            _ = shutdown.changed() => {
                abort.abort();
                break;
            }
            outcome = run => outcome,
        };
        if let Some(scheduler) = scheduler.as_mut() {
            scheduler.record_tick_end();
        }

        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(err) if err.is_panic() => "handler panicked".to_owned(),
            Err(_) => "handler was cancelled".to_owned(),
        };
        report(
            &diagnostics,
            ClientError::Handler {
                handler: name.clone(),
                message,
            },
        );
    }

    tracing::debug!(hook = %name, "interval stopped");
}

async fn next_tick(scheduler: Option<&mut IntervalScheduler>) -> TickInfo {
    match scheduler {
        Some(scheduler) => scheduler.wait_for_tick().await,
        None => std::future::pending().await,
    }
}
