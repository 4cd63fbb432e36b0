//! Core scheduling abstractions: admission, ordering, dispatch, and outcome tracking.

pub mod admission;
pub mod audit;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod task;

pub use admission::{AdmissionController, AdmissionPolicy, Feasibility, Verdict};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, RejectReason, Rejection, SchedulerError};
pub use executor::{ExecError, TaskExecutor};
pub use scheduler::{
    Admission, OutcomeTracker, ReadyQueue, Scheduler, SchedulerLimits, SchedulerSnapshot, Spawn,
    StatusSummary, SweepReport,
};
pub use task::{ScheduledTask, TaskDescriptor, TaskId, TaskRecord, TaskStatus};
