//! Deadline-aware scheduler: admission, EDF ready queue, bounded dispatch, outcome tracking.
//!
//! Locking:
//! - `control` guards the admission ledger and the ready queue (the single
//!   logical control path).
//! - `tracker` guards per-task records.
//! - Lock order is always `control` then `tracker`. A task's queue membership
//!   and its status change together while both are held, so a deadline-miss and
//!   a start-of-execution can never interleave on the same task.
//! - Execution slots are counted lock-free in an `AtomicU32` and reserved with
//!   a CAS loop before anything is popped.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::admission::{AdmissionController, AdmissionPolicy};
use crate::core::audit::{build_audit_event, AuditAction, AuditEvent, AuditSink};
use crate::core::error::{Rejection, SchedulerError};
use crate::core::executor::{ExecError, TaskExecutor};
use crate::core::task::{ScheduledTask, TaskDescriptor, TaskId, TaskRecord, TaskStatus};
use crate::util::clock::now_ms;

/// Ordering structure for admitted, not-yet-started tasks.
pub trait ReadyQueue {
    /// Insert an admitted task.
    fn push(&mut self, task: ScheduledTask) -> Result<(), SchedulerError>;
    /// Remove and return the task with the earliest deadline (FIFO among equals).
    fn pop_next(&mut self) -> Option<ScheduledTask>;
    /// All queued tasks in dispatch order, without removing them.
    fn peek_all(&self) -> Vec<ScheduledTask>;
    /// Remove every task whose deadline is at or before `now_ms` and return them.
    fn prune_expired(&mut self, now_ms: u128) -> Vec<ScheduledTask>;
    /// Maximum depth allowed for this queue.
    fn max_depth(&self) -> usize;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-status counts reported by a tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// Tasks waiting in the ready queue.
    pub pending: usize,
    /// Tasks currently executing.
    pub running: usize,
    /// Tasks that finished successfully.
    pub succeeded: usize,
    /// Tasks whose execution failed.
    pub failed: usize,
    /// Submissions refused at admission.
    pub rejected: usize,
    /// Tasks that aged out while queued.
    pub deadline_missed: usize,
}

impl StatusSummary {
    /// Adjust the counter for `status` by `delta` (+1 / -1).
    pub fn bump(&mut self, status: TaskStatus, delta: isize) {
        let slot = match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Succeeded => &mut self.succeeded,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Rejected => &mut self.rejected,
            TaskStatus::DeadlineMissed => &mut self.deadline_missed,
        };
        *slot = slot.saturating_add_signed(delta);
    }
}

/// Store of per-task status records.
pub trait OutcomeTracker {
    /// Start tracking a new record.
    fn insert(&mut self, record: TaskRecord);
    /// Move a task to `status` at `at_ms`, enforcing the task state machine.
    fn record(
        &mut self,
        task_id: TaskId,
        status: TaskStatus,
        at_ms: u128,
        detail: Option<String>,
    ) -> Result<TaskRecord, SchedulerError>;
    /// Look up a task.
    fn query(&self, task_id: TaskId) -> Option<TaskRecord>;
    /// Drop terminal records that finished before `cutoff_ms`; returns how many.
    fn evict_terminal_before(&mut self, cutoff_ms: u128) -> usize;
    /// Counts per status.
    fn summary(&self) -> StatusSummary;
    /// Number of tracked records.
    fn len(&self) -> usize;
    /// Whether nothing is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Configuration values for admission and dispatch.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Number of execution slots.
    pub concurrency: u32,
    /// Maximum queued tasks before rejection.
    pub max_queue_depth: usize,
    /// Feasibility policy.
    pub admission_policy: AdmissionPolicy,
    /// Re-queue attempts after an execution failure.
    pub max_retries: u32,
    /// How long terminal records stay queryable.
    pub retention: Duration,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            concurrency: u32::try_from(num_cpus::get()).unwrap_or(1).max(1),
            max_queue_depth: 10_000,
            admission_policy: AdmissionPolicy::BestEffort,
            max_retries: 0,
            retention: Duration::from_secs(3600),
        }
    }
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Queued as `Pending`.
    Accepted {
        /// Assigned identity.
        task_id: TaskId,
        /// Admitted despite an infeasible estimate.
        at_risk: bool,
        /// Estimated earliest completion (ms since epoch).
        earliest_completion_ms: u128,
    },
    /// Recorded as `Rejected`, never queued.
    Rejected {
        /// Assigned identity, queryable afterwards.
        task_id: TaskId,
        /// Why.
        rejection: Rejection,
    },
}

impl Admission {
    /// Identity assigned to the submission.
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::Accepted { task_id, .. } | Self::Rejected { task_id, .. } => *task_id,
        }
    }

    /// Whether the task was queued.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// What a maintenance sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Queued tasks moved to `DeadlineMissed`.
    pub missed: usize,
    /// Terminal records evicted past retention.
    pub evicted: usize,
}

/// Point-in-time view for the status reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    /// Configured slots.
    pub concurrency: u32,
    /// Slots currently occupied.
    pub busy_slots: u32,
    /// Ready queue depth.
    pub queued: usize,
    /// Admitted tasks still counted by the feasibility estimate.
    pub outstanding: usize,
    /// Active admission policy.
    pub admission_policy: AdmissionPolicy,
    /// Counts per status.
    pub tasks: StatusSummary,
}

struct Control<Q> {
    admission: AdmissionController,
    queue: Q,
    next_seq: u64,
}

struct Inner<Q, T, E, S> {
    limits: SchedulerLimits,
    control: Mutex<Control<Q>>,
    tracker: Mutex<T>,
    busy_slots: AtomicU32,
    executor: E,
    spawner: S,
    audit: Mutex<Vec<Box<dyn AuditSink>>>,
}

/// The deadline-aware scheduler.
///
/// Cheap to clone; clones share state. Handlers and the maintenance loop each
/// hold a clone.
pub struct Scheduler<Q, T, E, S> {
    inner: Arc<Inner<Q, T, E, S>>,
}

impl<Q, T, E, S> Clone for Scheduler<Q, T, E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q, T, E, S> Scheduler<Q, T, E, S> {
    /// Create a scheduler from its components.
    pub fn new(limits: SchedulerLimits, queue: Q, tracker: T, executor: E, spawner: S) -> Self {
        let admission = AdmissionController::new(limits.admission_policy, limits.concurrency);
        Self {
            inner: Arc::new(Inner {
                limits,
                control: Mutex::new(Control {
                    admission,
                    queue,
                    next_seq: 0,
                }),
                tracker: Mutex::new(tracker),
                busy_slots: AtomicU32::new(0),
                executor,
                spawner,
                audit: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attach an audit sink. Several may be attached.
    #[must_use]
    pub fn with_audit(self, sink: impl AuditSink + 'static) -> Self {
        self.inner.audit.lock().push(Box::new(sink));
        self
    }

    /// Configured limits.
    pub fn limits(&self) -> &SchedulerLimits {
        &self.inner.limits
    }

    /// Try to reserve a slot atomically using a CAS loop.
    fn try_reserve_slot(&self) -> bool {
        let max = self.inner.limits.concurrency;
        let mut current = self.inner.busy_slots.load(Ordering::Acquire);
        loop {
            if current >= max {
                return false;
            }
            match self.inner.busy_slots.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release_slot(&self) {
        let previous = self.inner.busy_slots.fetch_sub(1, Ordering::AcqRel);
        debug!(busy = previous.saturating_sub(1), "released slot");
    }

    fn emit(&self, events: Vec<AuditEvent>) {
        if events.is_empty() {
            return;
        }
        let mut sinks = self.inner.audit.lock();
        for event in events {
            for sink in sinks.iter_mut() {
                sink.record(event.clone());
            }
        }
    }
}

impl<Q, T, E, S> Scheduler<Q, T, E, S>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    /// Admit or reject a descriptor received at `now_ms`.
    ///
    /// Accepted tasks are queued as `Pending` and the dispatcher is run
    /// immediately, so with free slots they start without delay. Rejections are
    /// recorded and returned; they never touch the queue.
    pub fn submit(
        &self,
        descriptor: TaskDescriptor,
        now_ms: u128,
    ) -> Result<Admission, SchedulerError> {
        let task_id = TaskId::new_v4();
        let (admission, event) = {
            let mut control = self.inner.control.lock();
            let seq = control.next_seq;
            control.next_seq += 1;

            let verdict = control.admission.assess(&descriptor, now_ms).and_then(|v| {
                if control.queue.len() >= control.queue.max_depth() {
                    Err(Rejection::queue_full(control.queue.max_depth()))
                } else {
                    Ok(v)
                }
            });

            match verdict {
                Err(rejection) => self.record_rejection(task_id, seq, descriptor, now_ms, rejection),
                Ok(verdict) => {
                    let task = ScheduledTask {
                        id: task_id,
                        seq,
                        deadline_ms: verdict.deadline_ms,
                        submitted_at_ms: now_ms,
                        descriptor,
                    };
                    let record = TaskRecord::pending(&task, verdict.at_risk);
                    control.queue.push(task.clone())?;
                    control.admission.commit(&task);
                    if verdict.at_risk {
                        warn!(
                            task_id = %task_id,
                            name = %task.descriptor.name,
                            earliest_completion_ms = %verdict.feasibility.earliest_completion_ms,
                            deadline_ms = %task.deadline_ms,
                            "task admitted at risk of missing its deadline"
                        );
                    } else {
                        info!(task_id = %task_id, name = %task.descriptor.name, "task admitted");
                    }
                    let event = build_audit_event(AuditAction::Admit, &record);
                    self.inner.tracker.lock().insert(record);
                    (
                        Admission::Accepted {
                            task_id,
                            at_risk: verdict.at_risk,
                            earliest_completion_ms: verdict.feasibility.earliest_completion_ms,
                        },
                        event,
                    )
                }
            }
        };
        self.emit(vec![event]);
        self.dispatch_ready();
        Ok(admission)
    }

    /// Record a submission refused before it became a descriptor the
    /// controller could assess, e.g. an unparseable deadline.
    pub fn reject(
        &self,
        descriptor: TaskDescriptor,
        rejection: Rejection,
        now_ms: u128,
    ) -> Admission {
        let task_id = TaskId::new_v4();
        let (admission, event) = {
            let mut control = self.inner.control.lock();
            let seq = control.next_seq;
            control.next_seq += 1;
            self.record_rejection(task_id, seq, descriptor, now_ms, rejection)
        };
        self.emit(vec![event]);
        admission
    }

    /// Caller holds `control`.
    fn record_rejection(
        &self,
        task_id: TaskId,
        seq: u64,
        descriptor: TaskDescriptor,
        now_ms: u128,
        rejection: Rejection,
    ) -> (Admission, AuditEvent) {
        warn!(
            task_id = %task_id,
            name = %descriptor.name,
            reason = %rejection.reason,
            detail = %rejection.detail,
            "task rejected"
        );
        let record = TaskRecord::rejected(
            task_id,
            seq,
            descriptor,
            now_ms,
            rejection.reason,
            rejection.detail.clone(),
        );
        let event = build_audit_event(AuditAction::Reject, &record);
        self.inner.tracker.lock().insert(record);
        (Admission::Rejected { task_id, rejection }, event)
    }

    /// Fill every free slot from the ready queue.
    ///
    /// Called after each submission and completion, and by the maintenance loop.
    pub fn dispatch_ready(&self) {
        loop {
            if !self.try_reserve_slot() {
                debug!("all slots busy");
                break;
            }
            let Some(task) = self.next_runnable() else {
                self.release_slot();
                // a concurrent submit may have pushed and found every slot busy
                if !self.inner.control.lock().queue.is_empty() {
                    continue;
                }
                debug!("ready queue empty");
                break;
            };
            self.spawn_execution(task);
        }
    }

    /// Pop the next task whose deadline has not passed, marking it `Running`.
    ///
    /// Tasks found past their deadline are moved to `DeadlineMissed` on the way.
    fn next_runnable(&self) -> Option<ScheduledTask> {
        let mut events = Vec::new();
        let next = {
            let mut control = self.inner.control.lock();
            let mut tracker = self.inner.tracker.lock();
            loop {
                let Some(task) = control.queue.pop_next() else {
                    break None;
                };
                let now = now_ms();
                if now >= task.deadline_ms {
                    control.admission.release(task.deadline_ms, task.seq);
                    match tracker.record(task.id, TaskStatus::DeadlineMissed, now, None) {
                        Ok(record) => {
                            warn!(
                                task_id = %task.id,
                                name = %task.descriptor.name,
                                late_by_ms = %(now - task.deadline_ms),
                                "deadline passed while queued"
                            );
                            events.push(build_audit_event(AuditAction::Miss, &record));
                        }
                        Err(e) => error!("failed to record deadline miss: {e}"),
                    }
                    continue;
                }
                match tracker.record(task.id, TaskStatus::Running, now, None) {
                    Ok(record) => {
                        events.push(build_audit_event(AuditAction::Start, &record));
                        break Some(task);
                    }
                    Err(e) => {
                        error!("failed to mark task running, dropping it: {e}");
                        control.admission.release(task.deadline_ms, task.seq);
                    }
                }
            }
        };
        self.emit(events);
        next
    }

    fn spawn_execution(&self, task: ScheduledTask) {
        info!(task_id = %task.id, name = %task.descriptor.name, "dispatching task");
        let guard = ExecutionGuard {
            scheduler: self.clone(),
            task: Some(task),
        };
        self.inner.spawner.spawn(async move {
            let mut guard = guard;
            let outcome = match guard.task.as_ref() {
                Some(task) => {
                    guard
                        .scheduler
                        .inner
                        .executor
                        .execute(&task.descriptor.work_reference, &task.descriptor.args)
                        .await
                }
                None => return,
            };
            if let Some(task) = guard.task.take() {
                guard.scheduler.finish(task, outcome);
            }
        });
    }

    /// Record the outcome of an execution, release its slot, and dispatch again.
    fn finish(&self, task: ScheduledTask, outcome: Result<(), ExecError>) {
        let now = now_ms();
        let mut events = Vec::new();
        {
            let mut control = self.inner.control.lock();
            let mut tracker = self.inner.tracker.lock();
            let result = match outcome {
                Ok(()) => tracker
                    .record(task.id, TaskStatus::Succeeded, now, None)
                    .map(|record| (AuditAction::Complete, record)),
                Err(err) => {
                    let attempts = tracker.query(task.id).map_or(0, |r| r.attempts);
                    let can_retry = attempts <= self.inner.limits.max_retries
                        && now < task.deadline_ms
                        && control.queue.len() < control.queue.max_depth();
                    if can_retry {
                        warn!(task_id = %task.id, attempts, error = %err, "execution failed, retrying");
                        tracker
                            .record(task.id, TaskStatus::Pending, now, Some(err.to_string()))
                            .and_then(|record| {
                                control.queue.push(task.clone())?;
                                Ok((AuditAction::Retry, record))
                            })
                    } else {
                        tracker
                            .record(task.id, TaskStatus::Failed, now, Some(err.to_string()))
                            .map(|record| (AuditAction::Fail, record))
                    }
                }
            };
            match result {
                Ok((action, record)) => {
                    if record.status.is_terminal() {
                        control.admission.release(task.deadline_ms, task.seq);
                    }
                    match action {
                        AuditAction::Complete => info!(
                            task_id = %task.id,
                            name = %task.descriptor.name,
                            deadline_exceeded = record.deadline_exceeded,
                            "task succeeded"
                        ),
                        AuditAction::Fail => warn!(
                            task_id = %task.id,
                            name = %task.descriptor.name,
                            detail = ?record.detail,
                            deadline_exceeded = record.deadline_exceeded,
                            "task failed"
                        ),
                        _ => {}
                    }
                    events.push(build_audit_event(action, &record));
                }
                Err(e) => {
                    error!("failed to record outcome for task {}: {e}", task.id);
                    control.admission.release(task.deadline_ms, task.seq);
                }
            }
        }
        self.release_slot();
        self.emit(events);
        self.dispatch_ready();
    }

    /// Move expired queued tasks to `DeadlineMissed`, evict records past
    /// retention, then dispatch.
    pub fn sweep(&self, now_ms: u128) -> SweepReport {
        let mut events = Vec::new();
        let report = {
            let mut control = self.inner.control.lock();
            let mut tracker = self.inner.tracker.lock();
            let expired = control.queue.prune_expired(now_ms);
            let mut missed = 0;
            for task in expired {
                control.admission.release(task.deadline_ms, task.seq);
                match tracker.record(task.id, TaskStatus::DeadlineMissed, now_ms, None) {
                    Ok(record) => {
                        missed += 1;
                        events.push(build_audit_event(AuditAction::Miss, &record));
                    }
                    Err(e) => error!("failed to record deadline miss: {e}"),
                }
            }
            let cutoff = now_ms.saturating_sub(self.inner.limits.retention.as_millis());
            let evicted = tracker.evict_terminal_before(cutoff);
            SweepReport { missed, evicted }
        };
        if report.missed > 0 {
            warn!("pruned {} expired tasks", report.missed);
        }
        if report.evicted > 0 {
            debug!("evicted {} records past retention", report.evicted);
        }
        self.emit(events);
        self.dispatch_ready();
        report
    }

    /// Status record for a task.
    pub fn query(&self, task_id: TaskId) -> Result<TaskRecord, SchedulerError> {
        self.inner
            .tracker
            .lock()
            .query(task_id)
            .ok_or(SchedulerError::NotFound(task_id))
    }

    /// Queued tasks in dispatch order.
    pub fn peek_queue(&self) -> Vec<ScheduledTask> {
        self.inner.control.lock().queue.peek_all()
    }

    /// Counts for the status reporter.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let (queued, outstanding, admission_policy) = {
            let control = self.inner.control.lock();
            (
                control.queue.len(),
                control.admission.outstanding(),
                control.admission.policy(),
            )
        };
        let tasks = self.inner.tracker.lock().summary();
        SchedulerSnapshot {
            concurrency: self.inner.limits.concurrency,
            busy_slots: self.inner.busy_slots.load(Ordering::Acquire),
            queued,
            outstanding,
            admission_policy,
            tasks,
        }
    }
}

/// Records a failure and frees the slot if the execution future unwinds or is
/// dropped before the executor returns.
struct ExecutionGuard<Q, T, E, S>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler: Scheduler<Q, T, E, S>,
    task: Option<ScheduledTask>,
}

impl<Q, T, E, S> Drop for ExecutionGuard<Q, T, E, S>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let detail = if std::thread::panicking() {
                "executor panicked"
            } else {
                "execution aborted"
            };
            error!(task_id = %task.id, "{detail}");
            self.scheduler.finish(task, Err(ExecError::Failed(detail.into())));
        }
    }
}
