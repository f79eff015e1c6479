//! Integration tests for the pull-based streaming adapter
//!
//! These tests validate:
//! - Every outcome is yielded exactly once, then the stream ends
//! - Admission is driven by consumer demand (true backpressure)
//! - Worker errors surface both inline and through the failure hook
//! - An empty stream ends on the first poll
//! - Process timeouts apply per launched task
//! - Producer handles can feed the stream from other owners

use async_trait::async_trait;
use chanq::core::{AppResult, Queue, TaskError, Worker};
use futures::stream::FusedStream;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// TEST WORKERS
// ============================================================================

/// Worker that doubles its input, failing on multiples of three
#[derive(Clone)]
struct ThirdsFailWorker;

#[async_trait]
impl Worker<u64, u64> for ThirdsFailWorker {
    async fn process(&self, task: u64) -> AppResult<u64> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if task % 3 == 0 {
            anyhow::bail!("refusing multiple of three: {task}");
        }
        Ok(task * 2)
    }
}

/// Worker that counts invocations; task value selects the delay in
/// milliseconds
#[derive(Clone)]
struct PacedWorker {
    invoked: Arc<AtomicUsize>,
}

impl PacedWorker {
    fn new() -> Self {
        Self {
            invoked: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn invoked(&self) -> usize {
        self.invoked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker<u64, u64> for PacedWorker {
    async fn process(&self, delay_ms: u64) -> AppResult<u64> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(delay_ms)
    }
}

/// Worker that never completes within any test's patience
#[derive(Clone)]
struct StuckWorker;

#[async_trait]
impl Worker<u64, u64> for StuckWorker {
    async fn process(&self, task: u64) -> AppResult<u64> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(task)
    }
}

// ============================================================================
// TESTS
// ============================================================================

/// Test that the stream yields one outcome per task and then ends
#[tokio::test]
async fn test_stream_yields_all_outcomes_then_ends() {
    println!("\n=== test_stream_yields_all_outcomes_then_ends ===");

    let mut stream = Queue::channels(2)
        .worker(ThirdsFailWorker)
        .build_stream()
        .expect("Failed to create stream");

    for task in 1..=6 {
        stream.push(task);
    }

    let mut oks = Vec::new();
    let mut errs = 0;
    while let Some(outcome) = stream.next().await {
        match outcome {
            Ok(value) => oks.push(value),
            Err(err) => {
                println!("inline error: {err}");
                errs += 1;
            }
        }
    }

    oks.sort_unstable();
    println!("ok values: {oks:?}, errors: {errs}");
    assert_eq!(oks, vec![2, 4, 8, 10]); // 1,2,4,5 doubled; 3 and 6 fail
    assert_eq!(errs, 2);
    assert!(stream.is_terminated());
    assert!(
        stream.next().await.is_none(),
        "a finished stream stays finished"
    );

    let stats = stream.stats();
    println!("Final stats: {stats:?}");
    assert_eq!(stats.submitted, 6);
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.peak_in_flight, 2);

    println!("=== test_stream_yields_all_outcomes_then_ends PASSED ===\n");
}

/// Test that an unpolled stream stops admitting work
#[tokio::test]
async fn test_stream_backpressure_without_demand() {
    println!("\n=== test_stream_backpressure_without_demand ===");

    let worker = PacedWorker::new();
    let mut stream = Queue::channels(2)
        .worker(worker.clone())
        .build_stream()
        .expect("Failed to create stream");

    // one quick task, then a wall of slow ones
    stream.push(10);
    for _ in 0..9 {
        stream.push(200);
    }

    let first = stream.next().await.expect("one outcome should arrive");
    assert_eq!(first.expect("quick task should succeed"), 10);

    // first poll admitted 2; the poll that yielded the quick outcome
    // refilled the freed slot with one more
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(worker.invoked(), 3);

    // no further demand: completions alone must not admit anything
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        worker.invoked(),
        3,
        "admissions happened without consumer demand"
    );
    assert!(!stream.is_terminated());

    println!("=== test_stream_backpressure_without_demand PASSED ===\n");
}

/// Test that worker errors arrive both inline and through the failure hook
#[tokio::test]
async fn test_stream_error_dual_channels() {
    println!("\n=== test_stream_error_dual_channels ===");

    let hook_errors = Arc::new(AtomicUsize::new(0));
    let hook_count = Arc::clone(&hook_errors);

    let mut stream = Queue::channels(3)
        .worker(ThirdsFailWorker)
        .on_failure(move |err: &TaskError| {
            assert!(matches!(err, TaskError::Worker(_)));
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
        .build_stream()
        .expect("Failed to create stream");

    for task in 1..=9 {
        stream.push(task);
    }

    let outcomes: Vec<_> = (&mut stream).collect().await;
    let inline_errors = outcomes.iter().filter(|outcome| outcome.is_err()).count();

    println!(
        "inline errors: {inline_errors}, hook errors: {}",
        hook_errors.load(Ordering::SeqCst)
    );
    assert_eq!(outcomes.len(), 9);
    assert_eq!(inline_errors, 3); // 3, 6, 9
    assert_eq!(
        hook_errors.load(Ordering::SeqCst),
        3,
        "every inline error must also fire the out-of-band hook"
    );

    println!("=== test_stream_error_dual_channels PASSED ===\n");
}

/// Test that a stream with nothing queued ends immediately
#[tokio::test]
async fn test_empty_stream_ends_immediately() {
    println!("\n=== test_empty_stream_ends_immediately ===");

    let mut stream = Queue::<u64, u64>::channels(2)
        .worker(ThirdsFailWorker)
        .build_stream()
        .expect("Failed to create stream");

    assert!(stream.next().await.is_none());
    assert!(stream.is_terminated());

    // pushes after the end are dropped
    stream.push(1);
    assert!(stream.next().await.is_none());
    assert_eq!(stream.stats().submitted, 0);

    println!("=== test_empty_stream_ends_immediately PASSED ===\n");
}

/// Test that the processing deadline applies to streamed tasks
#[tokio::test]
async fn test_stream_process_timeout() {
    println!("\n=== test_stream_process_timeout ===");

    let hook_errors = Arc::new(AtomicUsize::new(0));
    let hook_count = Arc::clone(&hook_errors);

    let mut stream = Queue::channels(2)
        .worker(StuckWorker)
        .process_timeout(Duration::from_millis(30))
        .on_failure(move |err: &TaskError| {
            assert!(matches!(err, TaskError::ProcessTimedOut { .. }));
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
        .build_stream()
        .expect("Failed to create stream");

    for task in 0..3 {
        stream.push(task);
    }

    let start = Instant::now();
    let outcomes: Vec<_> = (&mut stream).collect().await;
    let elapsed = start.elapsed();

    println!("3 stuck tasks resolved in {elapsed:?}");
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(Result::is_err));
    assert_eq!(hook_errors.load(Ordering::SeqCst), 3);
    assert!(
        elapsed < Duration::from_millis(400),
        "timeouts should resolve long before the workers finish: {elapsed:?}"
    );
    assert_eq!(stream.stats().process_timeouts, 3);

    println!("=== test_stream_process_timeout PASSED ===\n");
}

/// Test that a cloned handle feeds the same stream
#[tokio::test]
async fn test_stream_handle_feeds_the_stream() {
    println!("\n=== test_stream_handle_feeds_the_stream ===");

    let mut stream = Queue::channels(2)
        .worker(ThirdsFailWorker)
        .build_stream()
        .expect("Failed to create stream");

    let handle = stream.handle();
    let second_handle = handle.clone();
    stream.push(1);
    handle.push(2);
    second_handle.push(4);

    let outcomes: Vec<_> = (&mut stream).collect().await;
    let mut values: Vec<u64> = outcomes
        .into_iter()
        .map(|outcome| outcome.expect("no multiples of three here"))
        .collect();
    values.sort_unstable();

    println!("values: {values:?}");
    assert_eq!(values, vec![2, 4, 8]);

    println!("=== test_stream_handle_feeds_the_stream PASSED ===\n");
}
