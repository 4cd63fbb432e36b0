//! In-memory outcome tracker.

use std::collections::HashMap;

use crate::core::{
    OutcomeTracker, SchedulerError, StatusSummary, TaskId, TaskRecord, TaskStatus,
};

/// Task records keyed by id, with running per-status counters.
#[derive(Default)]
pub struct InMemoryTracker {
    records: HashMap<TaskId, TaskRecord>,
    summary: StatusSummary,
}

impl InMemoryTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeTracker for InMemoryTracker {
    fn insert(&mut self, record: TaskRecord) {
        self.summary.bump(record.status, 1);
        if let Some(previous) = self.records.insert(record.id, record) {
            self.summary.bump(previous.status, -1);
        }
    }

    fn record(
        &mut self,
        task_id: TaskId,
        status: TaskStatus,
        at_ms: u128,
        detail: Option<String>,
    ) -> Result<TaskRecord, SchedulerError> {
        let record = self
            .records
            .get_mut(&task_id)
            .ok_or(SchedulerError::NotFound(task_id))?;
        let from = record.status;
        record.apply(status, at_ms, detail)?;
        self.summary.bump(from, -1);
        self.summary.bump(status, 1);
        Ok(record.clone())
    }

    fn query(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.records.get(&task_id).cloned()
    }

    fn evict_terminal_before(&mut self, cutoff_ms: u128) -> usize {
        let before = self.records.len();
        let summary = &mut self.summary;
        self.records.retain(|_, r| {
            let expired = r.status.is_terminal() && r.finished_at_ms.is_some_and(|f| f < cutoff_ms);
            if expired {
                summary.bump(r.status, -1);
            }
            !expired
        });
        before - self.records.len()
    }

    fn summary(&self) -> StatusSummary {
        self.summary
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
