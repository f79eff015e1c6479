//! Fluent construction of queues and streams.

use std::sync::Arc;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::core::error::{QueueError, TaskError, TaskResult};
use crate::core::queue::{Hooks, Queue};
use crate::core::worker::{CallbackWorker, Worker, WorkerKind};
use crate::runtime::{Spawn, TokioSpawner};
use crate::stream::QueueStream;

/// Builder for [`Queue`] and [`QueueStream`].
///
/// Obtained from [`Queue::channels`] or assembled from a parsed
/// [`QueueConfig`]. A worker must be supplied before `build`; everything else
/// has a default. When no spawner is given, the ambient tokio runtime is
/// used.
///
/// # Examples
///
/// ```rust,ignore
/// use chanq::core::Queue;
/// use std::time::Duration;
///
/// let queue = Queue::channels(4)
///     .process_timeout(Duration::from_secs(30))
///     .worker(MyWorker)
///     .on_failure(|err| eprintln!("task failed: {err}"))
///     .build()?;
/// ```
pub struct QueueBuilder<T, R> {
    config: QueueConfig,
    worker: Option<WorkerKind<T, R>>,
    hooks: Hooks<R>,
    spawner: Option<Arc<dyn Spawn>>,
}

impl<T, R> QueueBuilder<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start a builder from an existing configuration.
    pub fn from_config(config: QueueConfig) -> Self {
        Self {
            config,
            worker: None,
            hooks: Hooks::default(),
            spawner: None,
        }
    }

    /// Set the waiting-buffer timeout.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_wait_timeout(timeout);
        self
    }

    /// Set the processing deadline.
    #[must_use]
    pub fn process_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_process_timeout(timeout);
        self
    }

    /// Use a future-style worker.
    #[must_use]
    pub fn worker(mut self, worker: impl Worker<T, R>) -> Self {
        self.worker = Some(WorkerKind::Future(Arc::new(worker)));
        self
    }

    /// Use a callback-style worker.
    #[must_use]
    pub fn callback_worker(mut self, worker: impl CallbackWorker<T, R>) -> Self {
        self.worker = Some(WorkerKind::Callback(Arc::new(worker)));
        self
    }

    /// Register the hook for successful results.
    #[must_use]
    pub fn on_success(mut self, hook: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.hooks.success = Some(Arc::new(hook));
        self
    }

    /// Register the hook for terminal errors.
    ///
    /// Without this hook, errors are absorbed once `done` (if registered) has
    /// seen them; see [`Queue::on_failure`].
    #[must_use]
    pub fn on_failure(mut self, hook: impl Fn(&TaskError) + Send + Sync + 'static) -> Self {
        self.hooks.failure = Some(Arc::new(hook));
        self
    }

    /// Register the hook invoked with every terminal outcome.
    #[must_use]
    pub fn on_done(mut self, hook: impl Fn(&TaskResult<R>) + Send + Sync + 'static) -> Self {
        self.hooks.done = Some(Arc::new(hook));
        self
    }

    /// Register the hook invoked when the queue transitions to empty.
    #[must_use]
    pub fn on_drain(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.drain = Some(Arc::new(hook));
        self
    }

    /// Launch queue-internal futures through a custom executor instead of the
    /// ambient tokio runtime.
    #[must_use]
    pub fn spawner(mut self, spawner: impl Spawn + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Build the push-style queue.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidConfig`] on a zero concurrency limit,
    /// [`QueueError::MissingWorker`] when no worker was supplied, and
    /// [`QueueError::NoRuntime`] when no spawner was supplied and there is no
    /// ambient tokio runtime.
    pub fn build(self) -> Result<Queue<T, R>, QueueError> {
        let (config, worker, hooks, spawner) = self.into_parts()?;
        Ok(Queue::from_parts(&config, worker, hooks, spawner))
    }

    /// Build the pull-style stream over the same admission machinery.
    ///
    /// The stream consumes the worker, the processing deadline, and the
    /// `failure` hook (its out-of-band error channel); results flow to the
    /// consumer as stream items instead of through `success`/`done`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`build`](QueueBuilder::build).
    pub fn build_stream(self) -> Result<QueueStream<T, R>, QueueError> {
        let (config, worker, hooks, spawner) = self.into_parts()?;
        Ok(QueueStream::from_parts(
            &config,
            worker,
            hooks.failure,
            spawner,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn into_parts(
        self,
    ) -> Result<(QueueConfig, WorkerKind<T, R>, Hooks<R>, Arc<dyn Spawn>), QueueError> {
        self.config.validate().map_err(QueueError::InvalidConfig)?;
        let worker = self.worker.ok_or(QueueError::MissingWorker)?;
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => Arc::new(TokioSpawner::current()?),
        };
        Ok((self.config, worker, self.hooks, spawner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppResult;
    use async_trait::async_trait;

    struct Nop;

    #[async_trait]
    impl Worker<(), ()> for Nop {
        async fn process(&self, _task: ()) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_build_requires_a_worker() {
        let result = Queue::<(), ()>::channels(1).build();
        assert!(matches!(result, Err(QueueError::MissingWorker)));
    }

    #[tokio::test]
    async fn test_build_rejects_zero_channels() {
        let result = Queue::<(), ()>::channels(0).worker(Nop).build();
        assert!(matches!(result, Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_outside_runtime_needs_a_spawner() {
        let result = Queue::<(), ()>::channels(1).worker(Nop).build();
        assert!(matches!(result, Err(QueueError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let config = QueueConfig::from_json_str(r#"{"channels": 2, "process_timeout_ms": 500}"#)
            .expect("valid config");
        let queue = QueueBuilder::from_config(config).worker(Nop).build();
        assert!(queue.is_ok());
    }
}
