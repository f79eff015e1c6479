//! Tokio runtime spawner implementation.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::core::error::QueueError;
use crate::runtime::Spawn;

/// Tokio-based spawner that executes queue-internal futures on a tokio
/// runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Create a `TokioSpawner` bound to the runtime of the calling context.
    ///
    /// This is what the builder falls back to when no spawner is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NoRuntime`] when called outside a tokio runtime.
    pub fn current() -> Result<Self, QueueError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| QueueError::NoRuntime(e.to_string()))
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        self.handle.spawn(fut);
    }
}
