//! Worker traits and the one-shot completion guard.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::core::error::{AppResult, TaskError, TaskResult};
use crate::runtime::Spawn;

/// Future-style worker: processes one task and resolves with a result.
///
/// This is the shape to implement when the work is naturally expressed as an
/// async function. The queue awaits the returned future; an `Err` is routed to
/// the `failure` and `done` hooks like any other terminal outcome.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use chanq::core::{AppResult, Worker};
///
/// struct Doubler;
///
/// #[async_trait]
/// impl Worker<u32, u32> for Doubler {
///     async fn process(&self, task: u32) -> AppResult<u32> {
///         Ok(task * 2)
///     }
/// }
/// ```
#[async_trait]
pub trait Worker<T, R>: Send + Sync + 'static
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Process one task to completion.
    async fn process(&self, task: T) -> AppResult<R>;
}

/// Callback-style worker: starts one task and reports through a
/// [`Completion`] handle.
///
/// This is the shape to implement when completion arrives from somewhere the
/// worker does not control directly, such as a channel, an external callback,
/// or a task spawned onto another executor. The handle may be cloned and moved
/// freely; the first signal wins and every later one is ignored.
///
/// If every clone of the handle is dropped without signalling (including by a
/// panic inside the worker), the task is failed rather than left occupying a
/// slot forever.
///
/// # Example
///
/// ```rust,ignore
/// use chanq::core::{CallbackWorker, Completion};
///
/// struct Echo;
///
/// impl CallbackWorker<String, String> for Echo {
///     fn process(&self, task: String, completion: Completion<String>) {
///         tokio::spawn(async move {
///             completion.succeed(task);
///         });
///     }
/// }
/// ```
pub trait CallbackWorker<T, R>: Send + Sync + 'static
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start one task; report the outcome through `completion`.
    fn process(&self, task: T, completion: Completion<R>);
}

/// Idempotent completion guard handed to callback-style workers.
///
/// Exactly one signal is honored per task invocation. [`succeed`], [`fail`],
/// and [`complete`] all return `false` once a signal has already been accepted
/// or once the queue has stopped listening (e.g. after a process timeout), so
/// double-callback bugs in worker code cannot produce a second terminal
/// outcome.
///
/// [`succeed`]: Completion::succeed
/// [`fail`]: Completion::fail
/// [`complete`]: Completion::complete
pub struct Completion<R> {
    slot: Arc<Mutex<Option<oneshot::Sender<AppResult<R>>>>>,
}

impl<R> Clone for Completion<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R: Send + 'static> Completion<R> {
    /// Create a guard plus the receiver the queue's supervisor listens on.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<AppResult<R>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the task's outcome.
    ///
    /// Returns `true` if this call settled the task. Returns `false` when a
    /// signal was already accepted, or when the outcome no longer matters
    /// because the queue already reported a timeout for this task.
    pub fn complete(&self, outcome: AppResult<R>) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            debug!("completion already settled; extra signal ignored");
            return false;
        };
        match tx.send(outcome) {
            Ok(()) => true,
            Err(_) => {
                debug!("completion delivered after the task was already resolved; discarded");
                false
            }
        }
    }

    /// Deliver a successful outcome. See [`complete`](Completion::complete).
    pub fn succeed(&self, value: R) -> bool {
        self.complete(Ok(value))
    }

    /// Deliver a failed outcome. See [`complete`](Completion::complete).
    pub fn fail(&self, error: impl Into<anyhow::Error>) -> bool {
        self.complete(Err(error.into()))
    }

    /// Whether a signal has already been accepted by this guard.
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// The two worker shapes normalized onto a single completion signal.
pub(crate) enum WorkerKind<T, R> {
    Future(Arc<dyn Worker<T, R>>),
    Callback(Arc<dyn CallbackWorker<T, R>>),
}

impl<T, R> Clone for WorkerKind<T, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Future(w) => Self::Future(Arc::clone(w)),
            Self::Callback(w) => Self::Callback(Arc::clone(w)),
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> WorkerKind<T, R> {
    /// Start one task. The caller owns the matching receiver and must already
    /// be listening before this is called, so a worker that panics or
    /// completes inline cannot race the supervisor.
    pub(crate) fn invoke(&self, task: T, completion: Completion<R>, spawner: &dyn Spawn) {
        match self {
            Self::Future(worker) => {
                let worker = Arc::clone(worker);
                spawner.spawn(Box::pin(async move {
                    let outcome = worker.process(task).await;
                    completion.complete(outcome);
                }));
            }
            Self::Callback(worker) => worker.process(task, completion),
        }
    }
}

/// Map a supervisor's receive result onto the task outcome. A dropped
/// completion (worker panic, handle discarded) counts as a worker failure.
pub(crate) fn settle_signal<R>(
    signal: Result<AppResult<R>, oneshot::error::RecvError>,
) -> TaskResult<R> {
    match signal {
        Ok(outcome) => outcome.map_err(TaskError::Worker),
        Err(_) => Err(TaskError::worker(anyhow::anyhow!(
            "completion dropped before the task settled"
        ))),
    }
}
