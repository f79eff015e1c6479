//! Builders to construct queues and streams from configuration.

pub mod queue_builder;

pub use queue_builder::QueueBuilder;
