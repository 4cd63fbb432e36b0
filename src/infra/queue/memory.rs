//! In-memory ready queue ordered earliest-deadline-first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::{ReadyQueue, ScheduledTask, SchedulerError};

/// Wrapper ordering tasks by deadline (earliest first), then submission sequence.
struct EdfTask {
    task: ScheduledTask,
}

impl EdfTask {
    const fn key(&self) -> (u128, u64) {
        (self.task.deadline_ms, self.task.seq)
    }
}

impl PartialEq for EdfTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for EdfTask {}

impl PartialOrd for EdfTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdfTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the smallest (deadline, seq) surfaces.
        other.key().cmp(&self.key())
    }
}

/// In-memory queue storing scheduled tasks using a binary heap.
/// This provides O(log n) push and O(log n) pop operations.
pub struct InMemoryQueue {
    max_depth: usize,
    tasks: BinaryHeap<EdfTask>,
}

impl InMemoryQueue {
    /// Create a new in-memory queue with a maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            tasks: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }
}

impl ReadyQueue for InMemoryQueue {
    fn push(&mut self, task: ScheduledTask) -> Result<(), SchedulerError> {
        if self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull("max queue depth reached".into()));
        }
        self.tasks.push(EdfTask { task });
        Ok(())
    }

    fn pop_next(&mut self) -> Option<ScheduledTask> {
        self.tasks.pop().map(|t| t.task)
    }

    fn peek_all(&self) -> Vec<ScheduledTask> {
        let mut ordered: Vec<_> = self.tasks.iter().map(|t| t.task.clone()).collect();
        ordered.sort_by_key(|t| (t.deadline_ms, t.seq));
        ordered
    }

    fn prune_expired(&mut self, now_ms: u128) -> Vec<ScheduledTask> {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .tasks
            .drain()
            .partition(|t| t.task.deadline_ms <= now_ms);
        self.tasks = live.into_iter().collect();
        let mut expired: Vec<_> = expired.into_iter().map(|t| t.task).collect();
        expired.sort_by_key(|t| (t.deadline_ms, t.seq));
        expired
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}
