//! Error types for scheduler operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};

/// Reason code attached to a rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A required field is missing or invalid.
    Malformed,
    /// The deadline is not strictly after the submission time.
    DeadlinePassed,
    /// The deadline cannot plausibly be met and the strict policy is active.
    Infeasible,
    /// The ready queue reached its configured depth.
    QueueFull,
}

impl RejectReason {
    /// Stable wire code for the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::DeadlinePassed => "deadline_passed",
            Self::Infeasible => "infeasible",
            Self::QueueFull => "queue_full",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission-time rejection, surfaced synchronously to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}: {detail}")]
pub struct Rejection {
    /// Machine-readable reason code.
    pub reason: RejectReason,
    /// Human-readable explanation.
    pub detail: String,
}

impl Rejection {
    /// Malformed submission.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            reason: RejectReason::Malformed,
            detail: detail.into(),
        }
    }

    /// Deadline not in the future.
    pub fn deadline_passed(deadline_ms: u128, now_ms: u128) -> Self {
        Self {
            reason: RejectReason::DeadlinePassed,
            detail: format!("deadline {deadline_ms} is not after submission time {now_ms}"),
        }
    }

    /// Deadline cannot be met under the strict policy.
    pub fn infeasible(earliest_completion_ms: u128, deadline_ms: u128) -> Self {
        Self {
            reason: RejectReason::Infeasible,
            detail: format!(
                "earliest completion {earliest_completion_ms} exceeds deadline {deadline_ms}"
            ),
        }
    }

    /// Ready queue is at capacity.
    pub fn queue_full(max_depth: usize) -> Self {
        Self {
            reason: RejectReason::QueueFull,
            detail: format!("max queue depth {max_depth} reached"),
        }
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue is full.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// No record exists for the task.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// A status change the task state machine does not allow.
    #[error("illegal transition for task {task_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Task whose status was being changed.
        task_id: TaskId,
        /// Status held before the attempted change.
        from: TaskStatus,
        /// Status that was requested.
        to: TaskStatus,
    },
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
