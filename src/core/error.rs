//! Error types for queue operations.

use std::time::Duration;

use thiserror::Error;

/// Terminal failure reported for a single task.
///
/// Every task reaches at most one of these outcomes; the dispatcher never
/// reports a second terminal result for the same task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The worker itself failed: it returned an error, panicked, or dropped
    /// its completion handle without signalling.
    #[error("worker failed: {0}")]
    Worker(anyhow::Error),
    /// The task aged out in the waiting buffer before a slot freed up. Its
    /// worker was never invoked.
    #[error("timed out after waiting {waited:?}")]
    WaitTimedOut {
        /// Time the task spent in the waiting buffer.
        waited: Duration,
    },
    /// The task exceeded the processing deadline while running. The worker is
    /// not interrupted; any late completion it produces is discarded.
    #[error("timed out after processing for {limit:?}")]
    ProcessTimedOut {
        /// The configured processing deadline.
        limit: Duration,
    },
}

impl TaskError {
    /// Wrap an arbitrary worker-side error.
    pub fn worker(err: impl Into<anyhow::Error>) -> Self {
        Self::Worker(err.into())
    }

    /// Whether this outcome was produced by either timeout supervisor.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimedOut { .. } | Self::ProcessTimedOut { .. })
    }
}

/// Outcome of a single task as delivered to the `done` hook and to stream
/// consumers.
pub type TaskResult<R> = Result<R, TaskError>;

/// Errors produced while assembling a queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No worker was registered before `build`.
    #[error("no worker configured")]
    MissingWorker,
    /// No execution context could be resolved for the default spawner.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
