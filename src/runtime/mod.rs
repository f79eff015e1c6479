//! Execution-context adapters for queue-internal futures.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;

use futures::future::BoxFuture;

/// Abstraction over the executor used to launch worker invocations and
/// timeout supervisors.
///
/// The queue never blocks on the futures it hands over; it only requires that
/// they eventually run. Implementations must be cheap to call from
/// synchronous context.
pub trait Spawn: Send + Sync {
    /// Launch a detached future on the underlying executor.
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}
