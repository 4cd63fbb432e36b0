//! API-facing request/response models for the HTTP surface and batch files.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{
    Admission, AdmissionPolicy, RejectReason, Rejection, ScheduledTask, SchedulerError, SchedulerSnapshot,
    TaskDescriptor, TaskId, TaskRecord, TaskStatus,
};
use crate::util::clock::{datetime_to_ms, ms_to_rfc3339, secs_to_ms};

/// `POST /invoke` body, also the element type of an initial batch file.
///
/// Every field is optional on the wire so that incomplete submissions are
/// rejected as `malformed` with a recorded identity instead of a bare 4xx.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Task name.
    #[serde(default)]
    pub name: Option<String>,
    /// Opaque work reference handed to the executor.
    #[serde(default, alias = "work_reference")]
    pub script_path: Option<String>,
    /// Absolute deadline, RFC 3339 (naive timestamps are read as UTC).
    #[serde(default)]
    pub deadline: Option<String>,
    /// Deadline relative to receipt, in seconds. Ignored when `deadline` is set.
    #[serde(default)]
    pub deadline_offset: Option<f64>,
    /// Declared runtime estimate in seconds.
    #[serde(default)]
    pub est_runtime: Option<f64>,
    /// Executor arguments; scalars are stringified.
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Vec<String>,
}

impl InvokeRequest {
    /// Resolve the request into a descriptor received at `now_ms`.
    ///
    /// On error the partially-filled descriptor is returned alongside the
    /// rejection so the refusal can still be recorded.
    pub fn into_descriptor(
        self,
        now_ms: u128,
    ) -> Result<TaskDescriptor, (TaskDescriptor, Rejection)> {
        let deadline = match (&self.deadline, self.deadline_offset) {
            (Some(raw), _) => parse_deadline(raw).map(Some),
            (None, Some(offset)) => resolve_offset(offset, now_ms).map(Some),
            (None, None) => Ok(None),
        };
        let mut descriptor = TaskDescriptor {
            name: self.name.unwrap_or_default(),
            work_reference: self.script_path.unwrap_or_default(),
            deadline_ms: None,
            est_runtime_secs: self.est_runtime.unwrap_or(0.0),
            args: self.args,
        };
        match deadline {
            Ok(deadline_ms) => {
                descriptor.deadline_ms = deadline_ms;
                Ok(descriptor)
            }
            Err(rejection) => Err((descriptor, rejection)),
        }
    }
}

// Non-positive offsets resolve to `now_ms` so admission reports them as already passed.
fn resolve_offset(offset: f64, now_ms: u128) -> Result<u128, Rejection> {
    if !offset.is_finite() {
        return Err(Rejection::malformed(format!(
            "deadline_offset must be finite, got {offset}"
        )));
    }
    if offset <= 0.0 {
        return Ok(now_ms);
    }
    secs_to_ms(offset)
        .and_then(|ms| now_ms.checked_add(ms))
        .ok_or_else(|| Rejection::malformed(format!("deadline_offset {offset} is out of range")))
}

fn parse_deadline(raw: &str) -> Result<u128, Rejection> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
        })
        .map_err(|e| Rejection::malformed(format!("invalid deadline `{raw}`: {e}")))?;
    datetime_to_ms(&parsed)
        .ok_or_else(|| Rejection::malformed(format!("deadline `{raw}` is before the epoch")))
}

fn deserialize_args<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "args must be scalars, got {other}"
            ))),
        })
        .collect()
}

/// `POST /invoke` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Assigned identity; absent only when the body could not be read at all.
    pub task_id: Option<TaskId>,
    /// `pending` or `rejected`.
    pub status: TaskStatus,
    /// Admitted with an infeasible estimate.
    #[serde(default)]
    pub at_risk: bool,
    /// Estimated earliest completion (RFC 3339), on acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_completion: Option<String>,
    /// Rejection reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Human-readable rejection detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&Admission> for InvokeResponse {
    fn from(admission: &Admission) -> Self {
        match admission {
            Admission::Accepted {
                task_id,
                at_risk,
                earliest_completion_ms,
            } => Self {
                task_id: Some(*task_id),
                status: TaskStatus::Pending,
                at_risk: *at_risk,
                earliest_completion: Some(ms_to_rfc3339(*earliest_completion_ms)),
                reason: None,
                detail: None,
            },
            Admission::Rejected { task_id, rejection } => Self {
                task_id: Some(*task_id),
                status: TaskStatus::Rejected,
                at_risk: false,
                earliest_completion: None,
                reason: Some(rejection.reason),
                detail: Some(rejection.detail.clone()),
            },
        }
    }
}

/// `GET /tasks/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    /// Identity.
    pub task_id: TaskId,
    /// Task name.
    pub name: String,
    /// Work reference.
    pub script_path: String,
    /// Executor arguments.
    pub args: Vec<String>,
    /// Current status.
    pub status: TaskStatus,
    /// Deadline (RFC 3339), absent for malformed submissions.
    pub deadline: Option<String>,
    /// Declared estimate in seconds.
    pub est_runtime: f64,
    /// Receipt time.
    pub submitted_at: String,
    /// Start of the last execution attempt.
    pub started_at: Option<String>,
    /// Time the record became terminal.
    pub finished_at: Option<String>,
    /// Admitted with an infeasible estimate.
    pub at_risk: bool,
    /// Finished after its deadline.
    pub deadline_exceeded: bool,
    /// Execution attempts so far.
    pub attempts: u32,
    /// Rejection reason code.
    pub reason: Option<RejectReason>,
    /// Rejection or failure detail.
    pub detail: Option<String>,
}

impl From<TaskRecord> for TaskView {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.id,
            status: record.status,
            deadline: record.descriptor.deadline_ms.map(ms_to_rfc3339),
            est_runtime: record.descriptor.est_runtime_secs,
            submitted_at: ms_to_rfc3339(record.submitted_at_ms),
            started_at: record.started_at_ms.map(ms_to_rfc3339),
            finished_at: record.finished_at_ms.map(ms_to_rfc3339),
            at_risk: record.at_risk,
            deadline_exceeded: record.deadline_exceeded,
            attempts: record.attempts,
            reason: record.reject_reason,
            detail: record.detail,
            name: record.descriptor.name,
            script_path: record.descriptor.work_reference,
            args: record.descriptor.args,
        }
    }
}

/// One `GET /peek` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedView {
    /// Identity.
    pub task_id: TaskId,
    /// Task name.
    pub name: String,
    /// Deadline (RFC 3339).
    pub deadline: String,
    /// Declared estimate in seconds.
    pub est_runtime: f64,
}

impl From<&ScheduledTask> for QueuedView {
    fn from(task: &ScheduledTask) -> Self {
        Self {
            task_id: task.id,
            name: task.descriptor.name.clone(),
            deadline: ms_to_rfc3339(task.deadline_ms),
            est_runtime: task.descriptor.est_runtime_secs,
        }
    }
}

/// `GET /status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Initialization finished.
    pub ready: bool,
    /// Ready queue depth.
    pub queued: usize,
    /// Executing tasks.
    pub running: u32,
    /// Configured slots.
    pub concurrency: u32,
    /// Admitted tasks not yet terminal.
    pub outstanding: usize,
    /// `best_effort` or `strict`.
    pub admission_policy: AdmissionPolicy,
}

impl StatusResponse {
    /// Build from a scheduler snapshot.
    pub const fn new(ready: bool, snapshot: &SchedulerSnapshot) -> Self {
        Self {
            ready,
            queued: snapshot.queued,
            running: snapshot.busy_slots,
            concurrency: snapshot.concurrency,
            outstanding: snapshot.outstanding,
            admission_policy: snapshot.admission_policy,
        }
    }
}

/// Read an initial batch: a JSON array of [`InvokeRequest`].
pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<InvokeRequest>, SchedulerError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SchedulerError::Backend(format!("read batch {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| SchedulerError::Backend(format!("parse batch {}: {e}", path.display())))
}
