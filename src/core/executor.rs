//! The executor capability: the opaque operation that actually runs a task.

use async_trait::async_trait;
use thiserror::Error;

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The capability itself could not be invoked (e.g. spawn failed).
    #[error("executor unavailable: {0}")]
    Unavailable(String),
    /// The work ran and exited with a non-zero code.
    #[error("non-zero exit code: {code}")]
    NonZeroExit {
        /// Process exit code.
        code: i32,
    },
    /// The work was terminated by a signal.
    #[error("killed by signal")]
    KilledBySignal,
    /// The work reported a failure of its own.
    #[error("execution failed: {0}")]
    Failed(String),
}

/// Abstraction for executing a task's referenced work.
///
/// The scheduler never interprets `work_reference`; resolving it to runnable
/// code is entirely the executor's business. Implementations may be slow and may
/// fail; every call runs on its own spawned task so one slow execution never
/// holds up admission or the other slots.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use deadline_invoke::core::{ExecError, TaskExecutor};
///
/// #[derive(Clone)]
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl TaskExecutor for EchoExecutor {
///     async fn execute(&self, work_reference: &str, args: &[String]) -> Result<(), ExecError> {
///         tracing::info!(%work_reference, ?args, "echo");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + Clone + 'static {
    /// Run `work_reference` with `args`.
    async fn execute(&self, work_reference: &str, args: &[String]) -> Result<(), ExecError>;
}
