//! Pull-based streaming adapter over the queue's admission machinery.
//!
//! [`QueueStream`] exposes the bounded-concurrency scheduler as a
//! `futures::Stream` of task outcomes whose production rate follows consumer
//! demand: admissions happen only inside `poll_next`, up to the concurrency
//! limit, and each completion wakes the consumer so the window refills on the
//! next poll. A stream that nobody polls launches nothing beyond the demand
//! already registered.
//!
//! The stream ends, permanently, when a poll finds nothing ready, nothing
//! running, and nothing waiting. Worker errors are delivered twice: inline as
//! an `Err` item in the sequence, and out-of-band through the stream's
//! `failure` hook at the moment the task settles.
//!
//! The wait timeout is not consulted here; tasks in a stream's buffer wait on
//! consumer demand, not on a free slot. The processing deadline applies to
//! each launched task exactly as in the push-style queue.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::stream::{FusedStream, Stream};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::core::error::{TaskError, TaskResult};
use crate::core::queue::{Counters, FailureHook, QueueStats};
use crate::core::worker::{settle_signal, Completion, WorkerKind};
use crate::runtime::Spawn;

struct StreamState<T, R> {
    waiting: VecDeque<T>,
    in_flight: usize,
    /// Settled outcomes not yet handed to the consumer.
    ready: VecDeque<TaskResult<R>>,
    waker: Option<Waker>,
    finished: bool,
    counters: Counters,
}

struct StreamShared<T, R> {
    limit: usize,
    process_timeout: Option<Duration>,
    worker: WorkerKind<T, R>,
    failure: Mutex<Option<FailureHook>>,
    spawner: Arc<dyn Spawn>,
    state: Mutex<StreamState<T, R>>,
    next_task_id: AtomicU64,
}

impl<T, R> StreamShared<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn push(&self, task: T) {
        let waker = {
            let mut state = self.state.lock();
            if state.finished {
                warn!("stream already ended; task dropped");
                return;
            }
            state.counters.submitted += 1;
            state.waiting.push_back(task);
            let depth = state.waiting.len();
            state.counters.note_waiting(depth);
            debug!(waiting = depth, "task queued behind consumer demand");
            state.waker.take()
        };
        // wake a parked consumer so its outstanding demand can admit the task
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Completion funnel for stream tasks: drive the out-of-band failure
    /// hook, buffer the inline outcome, and wake the consumer.
    fn settle(&self, id: u64, outcome: TaskResult<R>) {
        match &outcome {
            Ok(_) => debug!(task_id = id, "stream task succeeded"),
            Err(error) => {
                debug!(task_id = id, error = %error, "stream task failed");
                let hook = self.failure.lock().clone();
                if let Some(failure) = hook {
                    failure(error);
                }
            }
        }
        let waker = {
            let mut state = self.state.lock();
            state.in_flight -= 1;
            state.counters.record_outcome(&outcome);
            state.ready.push_back(outcome);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn launch(self: &Arc<Self>, id: u64, task: T) {
        let (completion, rx) = Completion::channel();
        let shared = Arc::clone(self);
        let deadline = self.process_timeout;
        self.spawner.spawn(Box::pin(async move {
            let outcome = match deadline {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(signal) => settle_signal(signal),
                    Err(_) => {
                        warn!(task_id = id, ?limit, "processing deadline exceeded");
                        Err(TaskError::ProcessTimedOut { limit })
                    }
                },
                None => settle_signal(rx.await),
            };
            shared.settle(id, outcome);
        }));
        self.worker.invoke(task, completion, self.spawner.as_ref());
    }
}

/// Pull-based stream of task outcomes, produced at the consumer's pace.
///
/// Feed tasks with [`push`](QueueStream::push) (or a cloned
/// [`StreamHandle`]), then consume with `futures::StreamExt`. Each item is
/// the [`TaskResult`] of one task; completion order follows execution, not
/// submission. Once the stream reports `None` it is over and later pushes are
/// dropped.
///
/// # Examples
///
/// ```rust,ignore
/// use chanq::core::Queue;
/// use futures::StreamExt;
///
/// let mut stream = Queue::channels(4).worker(Fetch).build_stream()?;
/// for url in urls {
///     stream.push(url);
/// }
/// while let Some(outcome) = stream.next().await {
///     match outcome {
///         Ok(body) => println!("fetched {} bytes", body.len()),
///         Err(err) => eprintln!("fetch failed: {err}"),
///     }
/// }
/// ```
pub struct QueueStream<T, R> {
    shared: Arc<StreamShared<T, R>>,
}

impl<T, R> QueueStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn from_parts(
        config: &QueueConfig,
        worker: WorkerKind<T, R>,
        failure: Option<FailureHook>,
        spawner: Arc<dyn Spawn>,
    ) -> Self {
        info!(
            channels = config.channels,
            process_timeout_ms = config.process_timeout_ms,
            "queue stream created"
        );
        Self {
            shared: Arc::new(StreamShared {
                limit: config.channels,
                process_timeout: config.process_timeout(),
                worker,
                failure: Mutex::new(failure),
                spawner,
                state: Mutex::new(StreamState {
                    waiting: VecDeque::new(),
                    in_flight: 0,
                    ready: VecDeque::new(),
                    waker: None,
                    finished: false,
                    counters: Counters::default(),
                }),
                next_task_id: AtomicU64::new(0),
            }),
        }
    }

    /// Feed one task into the stream's waiting buffer.
    ///
    /// Tasks pushed after the stream has ended are dropped with a warning.
    pub fn push(&self, task: T) {
        self.shared.push(task);
    }

    /// A clonable producer handle for pushing tasks from other owners.
    pub fn handle(&self) -> StreamHandle<T, R> {
        StreamHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Register (replacing any previous) the out-of-band error hook, invoked
    /// at the moment a task fails, ahead of the inline `Err` item.
    pub fn on_failure(&self, hook: impl Fn(&TaskError) + Send + Sync + 'static) {
        *self.shared.failure.lock() = Some(Arc::new(hook));
    }

    /// Snapshot current and cumulative activity.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        state
            .counters
            .snapshot(state.in_flight, state.waiting.len(), false)
    }
}

impl<T, R> Stream for QueueStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    type Item = TaskResult<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let shared = Arc::clone(&self.shared);
        let (item, launches) = {
            let mut state = shared.state.lock();
            if state.finished {
                return Poll::Ready(None);
            }
            let item = state.ready.pop_front();
            if item.is_none() && state.in_flight == 0 && state.waiting.is_empty() {
                // demand arrived while fully idle: the sequence is over
                state.finished = true;
                info!("stream drained");
                return Poll::Ready(None);
            }
            let mut launches = Vec::new();
            while state.in_flight < shared.limit {
                let Some(task) = state.waiting.pop_front() else {
                    break;
                };
                state.in_flight += 1;
                let running = state.in_flight;
                state.counters.note_in_flight(running);
                let id = shared.next_task_id.fetch_add(1, Ordering::Relaxed);
                launches.push((id, task));
            }
            if item.is_none() {
                state.waker = Some(cx.waker().clone());
            }
            (item, launches)
        };
        if !launches.is_empty() {
            debug!(count = launches.len(), "admitting tasks on consumer demand");
        }
        for (id, task) in launches {
            shared.launch(id, task);
        }
        match item {
            Some(outcome) => Poll::Ready(Some(outcome)),
            None => Poll::Pending,
        }
    }
}

impl<T, R> FusedStream for QueueStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn is_terminated(&self) -> bool {
        self.shared.state.lock().finished
    }
}

/// Clonable producer handle for feeding tasks into a [`QueueStream`].
pub struct StreamHandle<T, R> {
    shared: Arc<StreamShared<T, R>>,
}

impl<T, R> Clone for StreamHandle<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> StreamHandle<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Feed one task into the stream's waiting buffer.
    ///
    /// Same semantics as [`QueueStream::push`].
    pub fn push(&self, task: T) {
        self.shared.push(task);
    }
}
