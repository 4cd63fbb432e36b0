//! Assemble a [`Scheduler`] from configuration.

use tracing::info;

use crate::config::{MiddlewareConfig, SchedulerConfig};
use crate::core::{Scheduler, SchedulerError, Spawn, TaskExecutor};
use crate::infra::{InMemoryQueue, InMemoryTracker, PerfLogSink, ProcessExecutor};
use crate::runtime::TokioSpawner;

/// The scheduler the binary runs: in-memory queue and tracker, process executor.
pub type ProcessScheduler = Scheduler<InMemoryQueue, InMemoryTracker, ProcessExecutor, TokioSpawner>;

/// Build an in-memory scheduler around any executor and spawner.
pub fn build_scheduler<E, S>(
    cfg: &SchedulerConfig,
    executor: E,
    spawner: S,
) -> Result<Scheduler<InMemoryQueue, InMemoryTracker, E, S>, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    cfg.validate()
        .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;
    let limits = cfg.limits();
    info!(
        concurrency = limits.concurrency,
        max_queue_depth = limits.max_queue_depth,
        policy = ?limits.admission_policy,
        max_retries = limits.max_retries,
        "building scheduler"
    );
    let queue = InMemoryQueue::new(limits.max_queue_depth);
    Ok(Scheduler::new(
        limits,
        queue,
        InMemoryTracker::new(),
        executor,
        spawner,
    ))
}

/// Build the full middleware scheduler, attaching the CSV perf log if configured.
pub fn build_process_scheduler(
    cfg: &MiddlewareConfig,
    spawner: TokioSpawner,
) -> Result<ProcessScheduler, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;
    let executor = ProcessExecutor::new(cfg.executor.process_config());
    let scheduler = build_scheduler(&cfg.scheduler, executor, spawner)?;
    match &cfg.perf_log {
        Some(path) => {
            let sink = PerfLogSink::open(path)?;
            info!(path = %path.display(), "performance log enabled");
            Ok(scheduler.with_audit(sink))
        }
        None => Ok(scheduler),
    }
}
