//! Job execution: dispatching submitted jobs onto the task queue and
//! running them on a pool of workers.
//!
//! - [`Dispatcher`] creates a job, enqueues its task and marks it QUEUED.
//! - [`TaskExecutor`] runs the per-task protocol for one delivery.
//! - [`WorkerPool`] runs N independent dequeue loops.
//! - [`Reconciler`] re-enqueues jobs that never made it onto the queue.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod pool;
pub mod reconciler;

pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use error::WorkerError;
pub use executor::{DiscardReason, ExecutorSettings, TaskExecutor, TaskOutcome};
pub use pool::WorkerPool;
pub use reconciler::Reconciler;
