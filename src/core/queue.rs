//! Bounded-concurrency task queue: admission, run accounting, dispatch.
//!
//! The queue accepts arbitrarily many tasks but runs at most `channels` of
//! them at once. Overflow parks in a FIFO waiting buffer and is admitted as
//! slots free up. Every task exits through a single completion funnel that
//! drives the `success`/`failure`/`done`/`drain` hooks and pulls the next
//! waiting task, so the pipeline stays saturated without a polling loop.
//!
//! All bookkeeping lives behind one mutex; hooks and workers are always
//! invoked outside of it, so a hook may submit follow-up work into the same
//! queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::builders::QueueBuilder;
use crate::config::QueueConfig;
use crate::core::error::{TaskError, TaskResult};
use crate::core::worker::{settle_signal, CallbackWorker, Completion, Worker, WorkerKind};
use crate::runtime::Spawn;

/// Hook invoked with a reference to each successful result.
pub(crate) type SuccessHook<R> = Arc<dyn Fn(&R) + Send + Sync>;
/// Hook invoked with each terminal error.
pub(crate) type FailureHook = Arc<dyn Fn(&TaskError) + Send + Sync>;
/// Hook invoked with every terminal outcome, after `success`/`failure`.
pub(crate) type DoneHook<R> = Arc<dyn Fn(&TaskResult<R>) + Send + Sync>;
/// Hook invoked when the queue transitions to empty.
pub(crate) type DrainHook = Arc<dyn Fn() + Send + Sync>;

/// Notification hooks. One slot per event; registering replaces.
pub(crate) struct Hooks<R> {
    pub(crate) success: Option<SuccessHook<R>>,
    pub(crate) failure: Option<FailureHook>,
    pub(crate) done: Option<DoneHook<R>>,
    pub(crate) drain: Option<DrainHook>,
}

impl<R> Default for Hooks<R> {
    fn default() -> Self {
        Self {
            success: None,
            failure: None,
            done: None,
            drain: None,
        }
    }
}

impl<R> Clone for Hooks<R> {
    fn clone(&self) -> Self {
        Self {
            success: self.success.clone(),
            failure: self.failure.clone(),
            done: self.done.clone(),
            drain: self.drain.clone(),
        }
    }
}

/// Cumulative activity counters, maintained under the state lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub(crate) submitted: u64,
    pub(crate) completed: u64,
    pub(crate) succeeded: u64,
    pub(crate) failed: u64,
    pub(crate) wait_timeouts: u64,
    pub(crate) process_timeouts: u64,
    pub(crate) peak_in_flight: usize,
    pub(crate) peak_waiting: usize,
}

impl Counters {
    pub(crate) fn note_in_flight(&mut self, in_flight: usize) {
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }

    pub(crate) fn note_waiting(&mut self, waiting: usize) {
        self.peak_waiting = self.peak_waiting.max(waiting);
    }

    /// Record a terminal outcome of a task that held a slot.
    pub(crate) fn record_outcome<R>(&mut self, outcome: &TaskResult<R>) {
        self.completed += 1;
        match outcome {
            Ok(_) => self.succeeded += 1,
            Err(TaskError::WaitTimedOut { .. }) => {
                self.failed += 1;
                self.wait_timeouts += 1;
            }
            Err(TaskError::ProcessTimedOut { .. }) => {
                self.failed += 1;
                self.process_timeouts += 1;
            }
            Err(TaskError::Worker(_)) => self.failed += 1,
        }
    }

    /// Record a task that aged out in the waiting buffer without ever
    /// holding a slot.
    pub(crate) fn record_expired(&mut self) {
        self.completed += 1;
        self.failed += 1;
        self.wait_timeouts += 1;
    }

    pub(crate) fn snapshot(&self, in_flight: usize, waiting: usize, paused: bool) -> QueueStats {
        QueueStats {
            in_flight,
            waiting,
            paused,
            submitted: self.submitted,
            completed: self.completed,
            succeeded: self.succeeded,
            failed: self.failed,
            wait_timeouts: self.wait_timeouts,
            process_timeouts: self.process_timeouts,
            peak_in_flight: self.peak_in_flight,
            peak_waiting: self.peak_waiting,
        }
    }
}

/// Point-in-time snapshot of queue activity.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Tasks currently executing.
    pub in_flight: usize,
    /// Tasks parked in the waiting buffer.
    pub waiting: usize,
    /// Whether admission is currently paused.
    pub paused: bool,
    /// Total tasks accepted.
    pub submitted: u64,
    /// Total tasks that reached a terminal outcome.
    pub completed: u64,
    /// Tasks that completed successfully.
    pub succeeded: u64,
    /// Tasks that failed, timeouts included.
    pub failed: u64,
    /// Tasks that aged out in the waiting buffer.
    pub wait_timeouts: u64,
    /// Tasks that exceeded the processing deadline.
    pub process_timeouts: u64,
    /// Highest concurrent in-flight count observed.
    pub peak_in_flight: usize,
    /// Deepest waiting buffer observed.
    pub peak_waiting: usize,
}

struct Waiting<T> {
    id: u64,
    task: T,
    queued_at: Instant,
}

struct Inner<T> {
    in_flight: usize,
    waiting: VecDeque<Waiting<T>>,
    paused: bool,
    /// Latch: set once the `drain` hook has fired for the current empty
    /// period, cleared on the next submission.
    drained: bool,
    counters: Counters,
}

struct Shared<T, R> {
    limit: usize,
    wait_timeout: Option<Duration>,
    process_timeout: Option<Duration>,
    state: Mutex<Inner<T>>,
    hooks: Mutex<Hooks<R>>,
    worker: Mutex<WorkerKind<T, R>>,
    spawner: Arc<dyn Spawn>,
    next_task_id: AtomicU64,
}

/// One admission decision taken under the state lock, acted on outside it.
enum Step<T> {
    Launch(u64, T),
    Expire(u64, Duration),
    Drained,
    Idle,
}

/// Bounded-concurrency task queue.
///
/// At most `channels` tasks execute at once; the rest wait in a FIFO buffer.
/// Tasks are handed to a caller-supplied [`Worker`] or [`CallbackWorker`],
/// and every terminal outcome is reported through the registered hooks:
/// `success` xor `failure`, then `done`, then `drain` once the queue empties.
///
/// `Queue` is a cheap clonable handle; clones share the same state.
///
/// # Examples
///
/// ```rust,ignore
/// use chanq::core::Queue;
///
/// let queue = Queue::channels(3)
///     .worker(MyWorker)
///     .on_done(|outcome| println!("finished: {outcome:?}"))
///     .on_drain(|| println!("all work finished"))
///     .build()?;
///
/// for job in jobs {
///     queue.submit(job);
/// }
/// ```
pub struct Queue<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for Queue<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> Queue<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start building a queue with the given concurrency limit.
    pub fn channels(limit: usize) -> QueueBuilder<T, R> {
        QueueBuilder::from_config(QueueConfig::new(limit))
    }

    pub(crate) fn from_parts(
        config: &QueueConfig,
        worker: WorkerKind<T, R>,
        hooks: Hooks<R>,
        spawner: Arc<dyn Spawn>,
    ) -> Self {
        info!(
            channels = config.channels,
            wait_timeout_ms = config.wait_timeout_ms,
            process_timeout_ms = config.process_timeout_ms,
            "queue created"
        );
        Self {
            shared: Arc::new(Shared {
                limit: config.channels,
                wait_timeout: config.wait_timeout(),
                process_timeout: config.process_timeout(),
                state: Mutex::new(Inner {
                    in_flight: 0,
                    waiting: VecDeque::new(),
                    paused: false,
                    drained: true,
                    counters: Counters::default(),
                }),
                hooks: Mutex::new(hooks),
                worker: Mutex::new(worker),
                spawner,
                next_task_id: AtomicU64::new(0),
            }),
        }
    }

    /// Submit a task. Never blocks and never fails.
    ///
    /// If a slot is free and the queue is not paused, the task starts
    /// immediately; otherwise it is appended to the waiting buffer with its
    /// enqueue time recorded for wait-timeout evaluation.
    pub fn submit(&self, task: T) {
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let admitted = {
            let mut state = self.shared.state.lock();
            state.counters.submitted += 1;
            state.drained = false;
            if state.paused || state.in_flight >= self.shared.limit {
                state.waiting.push_back(Waiting {
                    id,
                    task,
                    queued_at: Instant::now(),
                });
                let depth = state.waiting.len();
                state.counters.note_waiting(depth);
                debug!(task_id = id, waiting = depth, "task parked");
                None
            } else {
                state.in_flight += 1;
                let running = state.in_flight;
                state.counters.note_in_flight(running);
                debug!(task_id = id, in_flight = running, "task admitted");
                Some(task)
            }
        };
        if let Some(task) = admitted {
            self.launch(id, task);
        }
    }

    /// Stop admitting tasks from the waiting buffer.
    ///
    /// Already-running tasks continue; new submissions still land in the
    /// waiting buffer.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if !state.paused {
            state.paused = true;
            info!(
                in_flight = state.in_flight,
                waiting = state.waiting.len(),
                "queue paused"
            );
        }
    }

    /// Resume admission and immediately backfill every free slot from the
    /// waiting buffer, in FIFO order.
    pub fn resume(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.paused {
                state.paused = false;
                info!(waiting = state.waiting.len(), "queue resumed");
            }
        }
        self.pump();
    }

    /// Whether admission is currently paused.
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// The configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Number of tasks parked in the waiting buffer.
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    /// Snapshot current and cumulative activity.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        state
            .counters
            .snapshot(state.in_flight, state.waiting.len(), state.paused)
    }

    /// Replace the worker with a future-style implementation.
    ///
    /// Safe to call before the first submission or while paused with nothing
    /// in flight; tasks already handed to the previous worker are unaffected.
    pub fn set_worker(&self, worker: impl Worker<T, R>) {
        *self.shared.worker.lock() = WorkerKind::Future(Arc::new(worker));
    }

    /// Replace the worker with a callback-style implementation.
    ///
    /// Same replacement rules as [`set_worker`](Queue::set_worker).
    pub fn set_callback_worker(&self, worker: impl CallbackWorker<T, R>) {
        *self.shared.worker.lock() = WorkerKind::Callback(Arc::new(worker));
    }

    /// Register (replacing any previous) the hook for successful results.
    pub fn on_success(&self, hook: impl Fn(&R) + Send + Sync + 'static) {
        self.shared.hooks.lock().success = Some(Arc::new(hook));
    }

    /// Register (replacing any previous) the hook for terminal errors.
    ///
    /// **If no failure hook is registered, errors are absorbed**: they reach
    /// the `done` hook (if any) and are otherwise dropped. That is the
    /// deliberate default; register at least `done` to observe outcomes
    /// reliably.
    pub fn on_failure(&self, hook: impl Fn(&TaskError) + Send + Sync + 'static) {
        self.shared.hooks.lock().failure = Some(Arc::new(hook));
    }

    /// Register (replacing any previous) the hook invoked with every terminal
    /// outcome, after `success`/`failure`.
    pub fn on_done(&self, hook: impl Fn(&TaskResult<R>) + Send + Sync + 'static) {
        self.shared.hooks.lock().done = Some(Arc::new(hook));
    }

    /// Register (replacing any previous) the hook invoked each time the queue
    /// transitions to empty: nothing in flight, nothing waiting.
    pub fn on_drain(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.hooks.lock().drain = Some(Arc::new(hook));
    }

    /// Start one admitted task: hand it to the worker and spawn the
    /// supervisor that waits for the completion signal, racing the processing
    /// deadline when one is configured.
    ///
    /// The supervisor is listening before the worker is invoked, so a worker
    /// that completes inline or panics cannot strand the slot.
    fn launch(&self, id: u64, task: T) {
        let worker = self.shared.worker.lock().clone();
        let (completion, rx) = Completion::channel();
        let queue = self.clone();
        let deadline = self.shared.process_timeout;
        self.shared.spawner.spawn(Box::pin(async move {
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
            queue.finish(id, outcome);
        }));
        worker.invoke(task, completion, self.shared.spawner.as_ref());
    }

    /// The single completion funnel for tasks that held a slot.
    ///
    /// Hook order is fixed: `failure` xor `success`, then `done`, then the
    /// slot is released and the waiting buffer is pumped. Hooks run with no
    /// locks held.
    fn finish(&self, id: u64, outcome: TaskResult<R>) {
        let hooks = self.shared.hooks.lock().clone();
        match &outcome {
            Ok(value) => {
                debug!(task_id = id, "task succeeded");
                if let Some(success) = &hooks.success {
                    success(value);
                }
            }
            Err(error) => {
                debug!(task_id = id, error = %error, "task failed");
                if let Some(failure) = &hooks.failure {
                    failure(error);
                }
            }
        }
        if let Some(done) = &hooks.done {
            done(&outcome);
        }
        {
            let mut state = self.shared.state.lock();
            state.in_flight -= 1;
            state.counters.record_outcome(&outcome);
        }
        self.pump();
    }

    /// Fail a task that aged out in the waiting buffer. The worker is never
    /// invoked and no slot is released since none was held.
    fn expire(&self, id: u64, waited: Duration) {
        warn!(task_id = id, ?waited, "task aged out in the waiting buffer");
        let error = TaskError::WaitTimedOut { waited };
        let hooks = self.shared.hooks.lock().clone();
        if let Some(failure) = &hooks.failure {
            failure(&error);
        }
        let outcome: TaskResult<R> = Err(error);
        if let Some(done) = &hooks.done {
            done(&outcome);
        }
        self.shared.state.lock().counters.record_expired();
    }

    /// Work-list loop: while a slot is free and tasks are waiting, admit the
    /// next one (expiring stale entries along the way); fire `drain` exactly
    /// once when the queue transitions to empty.
    ///
    /// Iterative on purpose: completions, resume backfill, and expiry chains
    /// all funnel through this loop instead of re-entering each other, so
    /// bursty completions cannot grow the stack.
    fn pump(&self) {
        loop {
            let step = {
                let mut state = self.shared.state.lock();
                if !state.paused && state.in_flight < self.shared.limit {
                    if let Some(entry) = state.waiting.pop_front() {
                        let waited = entry.queued_at.elapsed();
                        match self.shared.wait_timeout {
                            Some(limit) if waited > limit => Step::Expire(entry.id, waited),
                            _ => {
                                state.in_flight += 1;
                                let running = state.in_flight;
                                state.counters.note_in_flight(running);
                                Step::Launch(entry.id, entry.task)
                            }
                        }
                    } else if state.in_flight == 0 && !state.drained {
                        state.drained = true;
                        Step::Drained
                    } else {
                        Step::Idle
                    }
                } else if state.in_flight == 0 && state.waiting.is_empty() && !state.drained {
                    // paused queues still report drain once everything settles
                    state.drained = true;
                    Step::Drained
                } else {
                    Step::Idle
                }
            };
            match step {
                Step::Launch(id, task) => {
                    debug!(task_id = id, "task admitted from the waiting buffer");
                    self.launch(id, task);
                }
                Step::Expire(id, waited) => self.expire(id, waited),
                Step::Drained => {
                    let drain = self.shared.hooks.lock().drain.clone();
                    info!("queue drained");
                    if let Some(drain) = drain {
                        drain();
                    }
                    break;
                }
                Step::Idle => break,
            }
        }
    }
}
