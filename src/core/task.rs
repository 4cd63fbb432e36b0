//! Task descriptors, scheduled tasks, and the per-task status record.

use serde::{Deserialize, Serialize};

use crate::core::error::{RejectReason, SchedulerError};

/// Identity assigned to every submission, accepted or not.
pub type TaskId = uuid::Uuid;

/// Status of a task in the scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted and waiting in the ready queue.
    Pending,
    /// Handed to the executor.
    Running,
    /// Executor reported success.
    Succeeded,
    /// Executor reported an error, or could not be invoked.
    Failed,
    /// Refused at admission.
    Rejected,
    /// Deadline passed before the task could start.
    DeadlineMissed,
}

impl TaskStatus {
    /// Terminal states never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Rejected | Self::DeadlineMissed
        )
    }

    /// Whether the state machine allows `self -> next`.
    ///
    /// `Running -> Pending` exists only for the retry hook.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::DeadlineMissed)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Pending)
        )
    }

    /// Stable lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::DeadlineMissed => "deadline_missed",
        }
    }
}

/// Caller-supplied description of one unit of work.
///
/// `deadline_ms` is optional only so that a missing or unparsable deadline can
/// travel to admission and be rejected there as malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Opaque name, not required to be unique.
    pub name: String,
    /// Handle the executor resolves to runnable code.
    pub work_reference: String,
    /// Absolute deadline in milliseconds since epoch.
    pub deadline_ms: Option<u128>,
    /// Caller's runtime estimate in seconds.
    pub est_runtime_secs: f64,
    /// Arguments passed through to the executor.
    pub args: Vec<String>,
}

impl TaskDescriptor {
    /// Build a descriptor with an absolute deadline.
    pub fn new(
        name: impl Into<String>,
        work_reference: impl Into<String>,
        deadline_ms: u128,
        est_runtime_secs: f64,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            work_reference: work_reference.into(),
            deadline_ms: Some(deadline_ms),
            est_runtime_secs,
            args,
        }
    }
}

/// An admitted task as held by the ready queue and handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Task identity.
    pub id: TaskId,
    /// Monotonic submission sequence, the FIFO tie-break among equal deadlines.
    pub seq: u64,
    /// Absolute deadline in milliseconds since epoch.
    pub deadline_ms: u128,
    /// Admission timestamp.
    pub submitted_at_ms: u128,
    /// The submitted descriptor.
    pub descriptor: TaskDescriptor,
}

/// Everything the outcome tracker knows about one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identity.
    pub id: TaskId,
    /// Submission sequence.
    pub seq: u64,
    /// The submitted descriptor.
    pub descriptor: TaskDescriptor,
    /// Current status.
    pub status: TaskStatus,
    /// Admission timestamp.
    pub submitted_at_ms: u128,
    /// Start of the most recent execution attempt.
    pub started_at_ms: Option<u128>,
    /// When the task reached a terminal state.
    pub finished_at_ms: Option<u128>,
    /// Admitted despite an infeasibility estimate.
    pub at_risk: bool,
    /// Finished executing after its deadline.
    pub deadline_exceeded: bool,
    /// Number of executor invocations so far.
    pub attempts: u32,
    /// Reason code when rejected.
    pub reject_reason: Option<RejectReason>,
    /// Rejection text or executor error.
    pub detail: Option<String>,
}

impl TaskRecord {
    /// Record for a freshly admitted task.
    pub fn pending(task: &ScheduledTask, at_risk: bool) -> Self {
        Self {
            id: task.id,
            seq: task.seq,
            descriptor: task.descriptor.clone(),
            status: TaskStatus::Pending,
            submitted_at_ms: task.submitted_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            at_risk,
            deadline_exceeded: false,
            attempts: 0,
            reject_reason: None,
            detail: None,
        }
    }

    /// Record for a submission refused at admission.
    pub fn rejected(
        id: TaskId,
        seq: u64,
        descriptor: TaskDescriptor,
        submitted_at_ms: u128,
        reason: RejectReason,
        detail: String,
    ) -> Self {
        Self {
            id,
            seq,
            descriptor,
            status: TaskStatus::Rejected,
            submitted_at_ms,
            started_at_ms: None,
            finished_at_ms: Some(submitted_at_ms),
            at_risk: false,
            deadline_exceeded: false,
            attempts: 0,
            reject_reason: Some(reason),
            detail: Some(detail),
        }
    }

    /// Apply a status change, enforcing the state machine.
    ///
    /// Entering `Running` stamps the start and counts an attempt. Entering a
    /// terminal state stamps the finish; a run that ends after its deadline is
    /// flagged `deadline_exceeded` but keeps its outcome.
    pub fn apply(
        &mut self,
        to: TaskStatus,
        at_ms: u128,
        detail: Option<String>,
    ) -> Result<(), SchedulerError> {
        if !self.status.can_transition_to(to) {
            return Err(SchedulerError::IllegalTransition {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        match to {
            TaskStatus::Running => {
                self.started_at_ms = Some(at_ms);
                self.attempts += 1;
            }
            TaskStatus::Succeeded | TaskStatus::Failed => {
                self.finished_at_ms = Some(at_ms);
                self.deadline_exceeded = self.descriptor.deadline_ms.is_some_and(|d| at_ms > d);
            }
            TaskStatus::DeadlineMissed | TaskStatus::Rejected => {
                self.finished_at_ms = Some(at_ms);
            }
            TaskStatus::Pending => {}
        }
        if detail.is_some() {
            self.detail = detail;
        }
        self.status = to;
        Ok(())
    }

    /// Time spent queued before the latest start, if started.
    pub fn wait_ms(&self) -> Option<u128> {
        self.started_at_ms
            .map(|started| started.saturating_sub(self.submitted_at_ms))
    }

    /// Duration of the latest execution attempt, if finished.
    pub fn exec_ms(&self) -> Option<u128> {
        match (self.started_at_ms, self.finished_at_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}
