//! Builders that assemble a scheduler from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{build_process_scheduler, build_scheduler, ProcessScheduler};
