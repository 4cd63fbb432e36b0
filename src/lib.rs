//! # Deadline Invoke
//!
//! Deadline-aware task invocation middleware. Callers submit named units of
//! work (a script reference, an absolute deadline, a runtime estimate, and
//! arguments) over HTTP; the middleware decides whether and when to run each
//! one so that as many as possible finish before their deadlines.
//!
//! ## Pipeline
//!
//! - **Admission**: structural validation, `deadline > now`, and a
//!   feasibility estimate against the work already admitted. Under
//!   `best_effort` infeasible tasks are admitted and flagged `at_risk`; under
//!   `strict` they are rejected as `infeasible`.
//! - **Ready queue**: earliest deadline first, FIFO among equal deadlines.
//!   Tasks found past their deadline when popped become `DeadlineMissed` and
//!   never run.
//! - **Dispatch**: a fixed number of slots reserved lock-free; each execution
//!   runs on its own tokio task through the injected [`core::TaskExecutor`].
//! - **Outcome tracking**: per-task records queryable by id, retained for a
//!   configurable period after reaching a terminal state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use deadline_invoke::builders::build_scheduler;
//! use deadline_invoke::config::SchedulerConfig;
//! use deadline_invoke::core::TaskDescriptor;
//! use deadline_invoke::infra::{ProcessConfig, ProcessExecutor};
//! use deadline_invoke::runtime::TokioSpawner;
//! use deadline_invoke::util::now_ms;
//!
//! let scheduler = build_scheduler(
//!     &SchedulerConfig::default(),
//!     ProcessExecutor::new(ProcessConfig::default()),
//!     TokioSpawner::current().unwrap(),
//! )?;
//! let now = now_ms();
//! let admission = scheduler.submit(
//!     TaskDescriptor::new("report", "jobs/report.py", now + 10_000, 2.0, vec![]),
//!     now,
//! )?;
//! println!("{:?}", scheduler.query(admission.task_id())?.status);
//! ```
//!
//! The `invoke-middleware` binary wires the same pieces to an axum server.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: admission, ordering, dispatch, tracking.
pub mod core;
/// Configuration models for the server, scheduler, and executor.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Infrastructure adapters: queue, tracker, process executor, perf log.
pub mod infra;
/// Runtime glue: spawner, HTTP surface, maintenance, readiness.
pub mod runtime;
/// Shared utilities.
pub mod util;
