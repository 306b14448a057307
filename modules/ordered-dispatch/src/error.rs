//! Typed errors for dispatch operations.

use thiserror::Error;

/// Errors surfaced to callers of `Scheduler::submit`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker pool refused to run a worker task.
    #[error("worker pool rejected task: {0}")]
    PoolRejected(String),

    /// No async runtime is available to host worker tasks.
    #[error("no tokio runtime available for worker pool")]
    NoRuntime,
}

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
