//! Infrastructure adapters: ready queue, outcome tracker, executor, and log sinks.

pub mod perf_log;
pub mod process;
pub mod queue;
pub mod tracker;

pub use perf_log::PerfLogSink;
pub use process::{ProcessConfig, ProcessExecutor};
pub use queue::InMemoryQueue;
pub use tracker::InMemoryTracker;
