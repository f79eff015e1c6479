//! # Chanq
//!
//! A bounded-concurrency task queue ("channelized queue") for async Rust.
//!
//! This library provides a single reusable scheduling primitive: it accepts
//! arbitrarily many units of work but runs at most N of them at once, parks
//! the rest in a FIFO waiting buffer, and notifies observers as each task
//! completes. A pull-based streaming adapter exposes the same machinery as a
//! `futures::Stream` whose production rate follows consumer demand.
//!
//! ## Core Problem Solved
//!
//! Fan-out workloads rarely tolerate unbounded concurrency:
//!
//! - **Connection ceilings**: databases, APIs, and scrape targets cap how
//!   many requests they accept at once
//! - **Memory pressure**: ten thousand in-flight jobs is ten thousand live
//!   buffers
//! - **Fairness**: once saturated, work should start in submission order, not
//!   whenever the executor feels like it
//! - **Stuck work**: a task that never finishes must not occupy a slot
//!   forever, and a task that waited too long may no longer be worth running
//!
//! ## Key Features
//!
//! - **Bounded admission**: at most `channels` tasks in flight, FIFO overflow
//! - **Two worker shapes**: future-style (`async fn process`) and
//!   callback-style with an idempotent completion guard
//! - **Timeout supervision**: per-wait and per-process deadlines that race
//!   normal completion without killing the worker
//! - **Pause/resume**: freeze admission without losing or duplicating work
//! - **Notification hooks**: `success`, `failure`, `done`, and `drain` fire
//!   outside all locks, so hooks can submit follow-up work
//! - **Pull streaming**: consume outcomes as a `futures::Stream` with real
//!   backpressure
//!
//! ## Push style
//!
//! ```rust,ignore
//! use chanq::core::{AppResult, Queue, Worker};
//! use async_trait::async_trait;
//!
//! struct Thumbnailer;
//!
//! #[async_trait]
//! impl Worker<String, Vec<u8>> for Thumbnailer {
//!     async fn process(&self, path: String) -> AppResult<Vec<u8>> {
//!         render_thumbnail(&path).await
//!     }
//! }
//!
//! let queue = Queue::channels(4)
//!     .worker(Thumbnailer)
//!     .on_failure(|err| tracing::warn!("thumbnail failed: {err}"))
//!     .on_drain(|| tracing::info!("batch finished"))
//!     .build()?;
//!
//! for path in paths {
//!     queue.submit(path);
//! }
//! ```
//!
//! ## Pull style
//!
//! ```rust,ignore
//! use chanq::core::Queue;
//! use futures::StreamExt;
//!
//! let mut outcomes = Queue::channels(8).worker(Fetcher).build_stream()?;
//! for url in urls {
//!     outcomes.push(url);
//! }
//! while let Some(outcome) = outcomes.next().await {
//!     println!("{outcome:?}");
//! }
//! ```
//!
//! For complete examples, see:
//! - `tests/queue_test.rs` - full integration tests for the push queue
//! - `tests/stream_test.rs` - backpressure and termination tests

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core queue machinery: errors, worker traits, and the queue itself.
pub mod core;
/// Configuration models for queue sizing and timeouts.
pub mod config;
/// Builders to construct queues and streams from configuration.
pub mod builders;
/// Runtime adapters for launching queue-internal futures.
pub mod runtime;
/// Pull-based streaming adapter with consumer-driven backpressure.
pub mod stream;
/// Shared utilities.
pub mod util;
