//! Audit sink implementations.
//!
//! Every lifecycle step of a task (admit, reject, start, complete, fail, miss,
//! retry) is emitted as an [`AuditEvent`] carrying a snapshot of the task record.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::task::TaskRecord;
use crate::util::clock::now_ms;

/// Lifecycle step an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Accepted into the ready queue.
    Admit,
    /// Refused at admission.
    Reject,
    /// Dispatched to the executor.
    Start,
    /// Executor reported success.
    Complete,
    /// Executor reported failure.
    Fail,
    /// Deadline passed while queued.
    Miss,
    /// Failed attempt re-queued.
    Retry,
}

impl AuditAction {
    /// Actions after which the task will not run again.
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Reject | Self::Complete | Self::Fail | Self::Miss)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Admit => "admit",
            Self::Reject => "reject",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Miss => "miss",
            Self::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Task record as of the event.
    pub record: TaskRecord,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Lets a caller keep a handle on a sink after handing it to the scheduler.
impl<S: AuditSink + ?Sized> AuditSink for Arc<Mutex<S>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Actions recorded for one task, oldest first.
    pub fn actions_for(&self, task_id: crate::core::TaskId) -> Vec<AuditAction> {
        self.events
            .iter()
            .filter(|e| e.record.id == task_id)
            .map(|e| e.action)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from a record snapshot.
pub fn build_audit_event(action: AuditAction, record: &TaskRecord) -> AuditEvent {
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{}-{}-{}", record.id, action, created_at_ms),
        action,
        created_at_ms,
        record: record.clone(),
    }
}
