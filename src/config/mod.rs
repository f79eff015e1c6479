//! Configuration models for queue sizing and timeouts.

pub mod queue;

pub use queue::QueueConfig;
