//! Queue backend trait.

use std::time::Duration;

use async_trait::async_trait;
use biopilot_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::message::{Delivery, TaskMessage};

/// Trait for task queue backends.
///
/// Implementations provide at-least-once delivery with leases: a dequeued
/// message is invisible to other consumers until it is acked, nacked, or
/// its lease expires.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publish a message that becomes visible immediately.
    ///
    /// At most one message per job is outstanding; enqueuing again for the
    /// same job returns the existing message id.
    async fn enqueue(&self, message: &TaskMessage) -> Result<DbId, QueueError> {
        self.enqueue_delayed(message, Duration::ZERO).await
    }

    /// Publish a message that becomes visible after `delay`.
    async fn enqueue_delayed(
        &self,
        message: &TaskMessage,
        delay: Duration,
    ) -> Result<DbId, QueueError>;

    /// Wait for the next visible message and lease it to `consumer`.
    ///
    /// Returns `Ok(None)` once `cancel` fires.
    async fn dequeue(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, QueueError>;

    /// Remove a message for good. Acking an unknown id is a no-op.
    async fn ack(&self, message_id: DbId) -> Result<(), QueueError>;

    /// Release a lease early; the message becomes visible after `delay`.
    async fn nack(&self, message_id: DbId, delay: Duration) -> Result<(), QueueError>;

    /// Push the lease of a message held by `consumer` forward.
    ///
    /// Returns `false` if the consumer no longer holds the message.
    async fn extend_lease(&self, message_id: DbId, consumer: &str) -> Result<bool, QueueError>;

    /// Number of messages not yet acked (visible, delayed or leased).
    async fn depth(&self) -> Result<u64, QueueError>;
}
