//! Periodic sweep: expire queued tasks, evict old records, re-pump dispatch.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::core::{OutcomeTracker, ReadyQueue, Scheduler, Spawn, TaskExecutor};
use crate::util::clock::now_ms;

/// Run sweeps every `interval` until `shutdown` turns `true` or its sender drops.
pub async fn run_maintenance<Q, T, E, S>(
    scheduler: Scheduler<Q, T, E, S>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = %interval.as_millis(), "maintenance loop started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = scheduler.sweep(now_ms());
                if report.missed > 0 || report.evicted > 0 {
                    debug!(missed = report.missed, evicted = report.evicted, "sweep");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("maintenance loop stopped");
}

/// Spawn [`run_maintenance`] on the current runtime.
pub fn spawn_maintenance<Q, T, E, S>(
    scheduler: Scheduler<Q, T, E, S>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    tokio::spawn(run_maintenance(scheduler, interval, shutdown))
}
