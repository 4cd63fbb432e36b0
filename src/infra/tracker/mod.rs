//! Outcome tracker backends.

pub mod memory;

pub use memory::InMemoryTracker;
