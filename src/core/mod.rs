//! Core queue machinery: errors, worker traits, and the queue itself.

pub mod error;
pub mod queue;
pub mod worker;

pub use error::{AppResult, QueueError, TaskError, TaskResult};
pub use queue::{Queue, QueueStats};
pub use worker::{CallbackWorker, Completion, Worker};
