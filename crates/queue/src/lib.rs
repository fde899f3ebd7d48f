//! Task queue between the dispatcher and the workers.
//!
//! Delivery is at-least-once with late acknowledgment: a message stays
//! leased to the worker that dequeued it until that worker acks it after
//! recording a terminal job status. A worker that dies before acking lets
//! its lease run out and the message is delivered again.

pub mod error;
pub mod memory;
pub mod message;
pub mod pg;
pub mod task_queue;

pub use error::QueueError;
pub use memory::MemoryTaskQueue;
pub use message::{Delivery, TaskMessage};
pub use pg::{PgQueueConfig, PgTaskQueue};
pub use task_queue::TaskQueue;
