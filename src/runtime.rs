//! Timer loops driving a [`Simulator`].
//!
//! [`run`] ticks on a wall-clock interval and applies commands as soon as
//! the store signals them. The simulator is borrowed mutably by the loop, so
//! a tick never overlaps another tick or a command; ticks that fall due
//! while one overruns are skipped. [`run_headless`] advances a synthetic
//! clock instead, for accelerated and reproducible runs.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sim::TickResult;
use crate::simulator::Simulator;
use crate::store::StateStore;

/// Local wall-clock time without offset, the simulator's time base.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Runs the real-time loop until `shutdown` resolves.
///
/// `wake` is the store's command signal (see
/// [`SharedStore::command_signal`](crate::store::SharedStore::command_signal)).
/// Returns the number of ticks executed.
pub async fn run<S, F>(sim: &mut Simulator<S>, wake: Arc<Notify>, shutdown: F) -> u64
where
    S: StateStore,
    F: Future<Output = ()>,
{
    let period = Duration::from_millis(sim.config().simulation.update_interval_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!(period_ms = period.as_millis() as u64, "simulation loop started");
    let mut ticks = 0u64;
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(ticks, "simulation loop stopping");
                break;
            }
            () = wake.notified() => {
                let handled = sim.process_commands(local_now());
                debug!(handled, "commands applied");
            }
            _ = interval.tick() => {
                let started = Instant::now();
                let now = local_now();
                sim.process_commands(now);
                if let Some(result) = sim.tick(now) {
                    debug!(%result);
                }
                ticks += 1;
                let took = started.elapsed();
                if took > period {
                    warn!(
                        took_ms = took.as_millis() as u64,
                        period_ms = period.as_millis() as u64,
                        "tick overran its period, due ticks are skipped"
                    );
                }
            }
        }
    }
    ticks
}

/// Runs `ticks` ticks on a synthetic clock starting at `start`, `step_ms`
/// apart. Pending commands are applied before each tick.
pub fn run_headless<S: StateStore>(
    sim: &mut Simulator<S>,
    start: NaiveDateTime,
    ticks: usize,
    step_ms: u64,
) -> Vec<TickResult> {
    let step = chrono::Duration::milliseconds(i64::try_from(step_ms).unwrap_or(i64::MAX));
    let mut now = start;
    let mut results = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        sim.process_commands(now);
        if let Some(result) = sim.tick(now) {
            results.push(result);
        }
        now += step;
    }
    results
}
