//! Interval scheduler for periodic client handlers.
//!
//! An interval handler runs every `period` for as long as the client is
//! connected. Each handler gets its own [`IntervalScheduler`], which
//! decides when the next run is due, pauses while the connection is down
//! and reports runs that take longer than their period.
//!
//! # Usage
//!
//! The scheduler sits inside the handler task's `tokio::select!` loop.
//! The run is awaited before the next wait, so runs of one handler never
//! overlap:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         tick = scheduler.wait_for_tick() => {
//!             handler(ctx.clone()).await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! A zero period disables the handler: [`IntervalScheduler::wait_for_tick`]
//! then pends forever.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a run finishes after the next one was due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalPolicy {
    /// Run once immediately, then resume the period from now.
    #[default]
    Skip,
    /// Run up to `max_catchup` missed runs back to back.
    CatchUp {
        /// Cap on consecutive catch-up runs.
        max_catchup: u32,
    },
    /// Keep the original cadence; late runs fire as soon as possible.
    Drop,
}

/// Configuration for one interval handler.
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Time between runs. Zero disables the handler.
    pub period: Duration,
    /// Overrun handling policy.
    pub policy: IntervalPolicy,
    /// Delay before the first run.
    pub initial_delay: Duration,
    /// Random extra delay (0 to this value) added to the first run so
    /// handlers registered together do not all fire at once.
    pub initial_jitter: Duration,
    /// Fraction of the period a run may take before a warning is logged.
    pub budget_warn_threshold: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            period: Duration::ZERO,
            policy: IntervalPolicy::default(),
            initial_delay: Duration::ZERO,
            initial_jitter: Duration::ZERO,
            budget_warn_threshold: 1.0,
        }
    }
}

impl IntervalConfig {
    /// Config for `period` with default settings.
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        if !self.budget_warn_threshold.is_finite() || self.budget_warn_threshold <= 0.0 {
            warn!(
                threshold = self.budget_warn_threshold,
                "invalid budget threshold, using 1.0"
            );
            self.budget_warn_threshold = 1.0;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a due run, returned by
/// [`IntervalScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Run number, starting at 1.
    pub tick: u64,
    /// `true` if the run is late by more than a tenth of the period.
    pub overrun: bool,
    /// How many runs were skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for one interval handler.
#[derive(Debug, Clone, Default)]
pub struct IntervalMetrics {
    /// Runs started.
    pub total_ticks: u64,
    /// Runs that started late.
    pub total_overruns: u64,
    /// Runs skipped by the policy.
    pub total_skipped: u64,
    /// Exponential moving average of run time (α = 0.1).
    pub avg_run_time: Duration,
    /// Longest run observed.
    pub max_run_time: Duration,
    /// Last run time divided by the period. Above 1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Decides when an interval handler runs next.
pub struct IntervalScheduler {
    config: IntervalConfig,
    tick_count: u64,
    next_tick: Option<Instant>,
    run_start: Option<Instant>,
    paused: bool,
    metrics: IntervalMetrics,
}

impl IntervalScheduler {
    /// Creates a scheduler. The first run is due after the initial delay
    /// plus jitter.
    pub fn new(config: IntervalConfig) -> Self {
        let config = config.validated();
        let next_tick = (!config.period.is_zero())
            .then(|| Instant::now() + config.initial_delay + jitter(config.initial_jitter));

        if next_tick.is_none() {
            debug!("interval scheduler created with zero period, it will never fire");
        } else {
            debug!(
                period_ms = config.period.as_millis() as u64,
                policy = ?config.policy,
                "interval scheduler created"
            );
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            run_start: None,
            paused: false,
            metrics: IntervalMetrics::default(),
        }
    }

    /// Creates a scheduler for `period` with default settings.
    pub fn every(period: Duration) -> Self {
        Self::new(IntervalConfig::every(period))
    }

    /// Waits until the next run is due.
    ///
    /// Pends forever while paused or when the period is zero.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let period = self.config.period;
        let next = match self.next_tick {
            Some(next) if !self.paused => next,
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.run_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let behind = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        let mut ticks_skipped = 0;

        self.next_tick = Some(match self.config.policy {
            IntervalPolicy::Skip => {
                ticks_skipped = behind;
                if behind > 0 {
                    warn!(
                        tick = self.tick_count,
                        skipped = behind,
                        late_ms = late_by.as_millis() as u64,
                        "interval overrun, skipping ahead"
                    );
                }
                now + period
            }
            IntervalPolicy::CatchUp { max_catchup } => {
                ticks_skipped = behind.saturating_sub(u64::from(max_catchup));
                if behind > 0 {
                    warn!(
                        tick = self.tick_count,
                        behind,
                        skipping = ticks_skipped,
                        "interval overrun, catching up"
                    );
                }
                if behind <= u64::from(max_catchup) {
                    next + period
                } else {
                    now + period
                }
            }
            IntervalPolicy::Drop => next + period,
        });

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;
        trace!(tick = self.tick_count, overrun, "interval due");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the current run finished.
    ///
    /// Without this call no budget warnings fire and run times are not
    /// tracked.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.run_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let period = self.config.period;

        let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "interval handler ran longer than its budget"
            );
        }

        if elapsed > self.metrics.max_run_time {
            self.metrics.max_run_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_run_time.as_secs_f64();
        self.metrics.avg_run_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Stops runs until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "interval scheduler paused");
        }
    }

    /// Restarts runs after a pause. The next run is one full period away.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if self.next_tick.is_some() {
                self.next_tick = Some(Instant::now() + self.config.period);
            }
            debug!(tick = self.tick_count, "interval scheduler resumed");
        }
    }

    /// Whether the scheduler is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the scheduler can ever fire.
    pub fn is_disabled(&self) -> bool {
        self.config.period.is_zero()
    }

    /// Runs started so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// Current metrics.
    pub fn metrics(&self) -> &IntervalMetrics {
        &self.metrics
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let nanos = rand::rng().random_range(0..max.as_nanos().min(u128::from(u64::MAX)) as u64);
    Duration::from_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_zero_is_zero() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_below_max() {
        let max = Duration::from_millis(5);
        for _ in 0..100 {
            assert!(jitter(max) < max);
        }
    }

    #[test]
    fn test_validated_fixes_bad_threshold() {
        let config = IntervalConfig {
            budget_warn_threshold: -1.0,
            ..IntervalConfig::every(Duration::from_secs(1))
        }
        .validated();
        assert_eq!(config.budget_warn_threshold, 1.0);
    }
}
