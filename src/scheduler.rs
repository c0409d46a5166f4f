//! Periodic dead-node sweep.
//!
//! [`LivenessScheduler`] ticks on a fixed period and asks the controller to
//! age out silent nodes. It runs independently of the broker connection.
//!
//! Sweeps never overlap: each one runs in its own task guarded by an
//! in-flight flag, and a tick that finds the flag set is skipped rather than
//! queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span};

use crate::controller::DeviceController;

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks fired so far.
    pub ticks: u64,
    /// Sweeps started (one per tick that was not skipped).
    pub sweeps_started: u64,
    /// Ticks skipped because a sweep was still running.
    pub skipped: u64,
    /// Sweeps that returned an error.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    sweeps_started: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            sweeps_started: self.sweeps_started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Clears the in-flight flag when the sweep task ends, even by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builder for the periodic sweep task.
pub struct LivenessScheduler {
    controller: Arc<dyn DeviceController>,
    period: Duration,
    span: Span,
}

impl std::fmt::Debug for LivenessScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessScheduler")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl LivenessScheduler {
    /// Creates a scheduler sweeping `controller` every `period`.
    ///
    /// A zero period is raised to one millisecond.
    #[must_use]
    pub fn new(controller: Arc<dyn DeviceController>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        Self {
            controller,
            period,
            span: tracing::info_span!("liveness", period_ms),
        }
    }

    /// Replaces the span the scheduler logs under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Spawns the ticking task. The first tick fires immediately.
    #[must_use]
    pub fn start(self) -> LivenessHandle {
        let counters = Arc::new(Counters::default());
        let in_flight = Arc::new(AtomicBool::new(false));
        let span = self.span.clone();

        let task = tokio::spawn(
            run(self.controller, self.period, in_flight, Arc::clone(&counters)).instrument(span),
        );
        LivenessHandle { task, counters }
    }
}

async fn run(
    controller: Arc<dyn DeviceController>,
    period: Duration,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!("liveness scheduler started");

    loop {
        ticker.tick().await;
        counters.ticks.fetch_add(1, Ordering::Relaxed);
        tick(&controller, &in_flight, &counters);
    }
}

/// Starts one sweep unless the previous one is still running.
fn tick(controller: &Arc<dyn DeviceController>, in_flight: &Arc<AtomicBool>, counters: &Arc<Counters>) {
    if in_flight.swap(true, Ordering::AcqRel) {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("previous sweep still running, tick skipped");
        return;
    }
    counters.sweeps_started.fetch_add(1, Ordering::Relaxed);

    let guard = InFlight(Arc::clone(in_flight));
    let controller = Arc::clone(controller);
    let counters = Arc::clone(counters);
    tokio::spawn(
        async move {
            let _guard = guard;
            match controller.check_dead_nodes().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "dead nodes removed"),
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "dead-node sweep failed");
                }
            }
        }
        .instrument(Span::current()),
    );
}

/// Running scheduler. Dropping the handle leaves the task running.
#[derive(Debug)]
pub struct LivenessHandle {
    task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl LivenessHandle {
    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Stops ticking. A sweep already running is left to finish.
    pub fn abort(&self) {
        self.task.abort();
    }
}
