//! Postgres-backed task queue on the `task_messages` table.
//!
//! Consumers claim with `FOR UPDATE SKIP LOCKED`, so concurrent workers
//! never block on or double-claim the same row. A claim sets a lease
//! (`leased_until`); the message stays invisible until the lease runs out.

use std::time::Duration;

use async_trait::async_trait;
use biopilot_core::types::{new_id, DbId, Timestamp};
use sqlx::{FromRow, PgPool};
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::message::{Delivery, TaskMessage};
use crate::task_queue::TaskQueue;

/// Default lease length for a claimed message.
const DEFAULT_LEASE_SECS: u64 = 60;

/// Default delay between polls while the queue is empty.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Column list returned to consumers.
const DELIVERY_COLUMNS: &str = "id, job_id, job_type, parameters, delivery_count, enqueued_at";

#[derive(Debug, Clone)]
pub struct PgQueueConfig {
    /// How long a claimed message stays invisible without a heartbeat.
    pub lease: Duration,
    /// Delay between polls while nothing is claimable.
    pub poll_interval: Duration,
}

impl Default for PgQueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(DEFAULT_LEASE_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: DbId,
    job_id: DbId,
    job_type: String,
    parameters: serde_json::Value,
    delivery_count: i32,
    enqueued_at: Timestamp,
}

impl From<MessageRow> for Delivery {
    fn from(row: MessageRow) -> Self {
        Delivery {
            message_id: row.id,
            message: TaskMessage {
                job_id: row.job_id,
                job_type: row.job_type,
                parameters: row.parameters,
            },
            delivery_count: row.delivery_count,
            enqueued_at: row.enqueued_at,
        }
    }
}

#[derive(Clone)]
pub struct PgTaskQueue {
    pool: PgPool,
    config: PgQueueConfig,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool, config: PgQueueConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &PgQueueConfig {
        &self.config
    }

    /// Claim one visible message, if any.
    async fn try_claim(&self, consumer: &str) -> Result<Option<Delivery>, QueueError> {
        let query = format!(
            "UPDATE task_messages SET \
                 leased_until = NOW() + make_interval(secs => $1), \
                 leased_by = $2, \
                 delivery_count = delivery_count + 1 \
             WHERE id = ( \
                 SELECT id FROM task_messages \
                 WHERE available_at <= NOW() \
                   AND (leased_until IS NULL OR leased_until < NOW()) \
                 ORDER BY available_at ASC, enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(self.config.lease.as_secs_f64())
            .bind(consumer)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Delivery::from))
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue_delayed(
        &self,
        message: &TaskMessage,
        delay: Duration,
    ) -> Result<DbId, QueueError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let id: DbId = sqlx::query_scalar(
            "INSERT INTO task_messages (id, job_id, job_type, parameters, available_at) \
             VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5)) \
             ON CONFLICT ON CONSTRAINT uq_task_messages_job_id \
             DO UPDATE SET job_id = EXCLUDED.job_id \
             RETURNING id",
        )
        .bind(new_id())
        .bind(message.job_id)
        .bind(&message.job_type)
        .bind(&message.parameters)
        .bind(delay.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            message_id = %id,
            job_id = %message.job_id,
            job_type = %message.job_type,
            delay_ms = delay.as_millis() as u64,
            "Enqueued task",
        );
        Ok(id)
    }

    async fn dequeue(
        &self,
        consumer: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(delivery) = self.try_claim(consumer).await? {
                tracing::debug!(
                    message_id = %delivery.message_id,
                    job_id = %delivery.message.job_id,
                    delivery_count = delivery.delivery_count,
                    consumer,
                    "Claimed task",
                );
                return Ok(Some(delivery));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, message_id: DbId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM task_messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nack(&self, message_id: DbId, delay: Duration) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE task_messages SET \
                 leased_until = NULL, \
                 leased_by = NULL, \
                 available_at = NOW() + make_interval(secs => $2) \
             WHERE id = $1",
        )
        .bind(message_id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn extend_lease(&self, message_id: DbId, consumer: &str) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE task_messages \
             SET leased_until = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND leased_by = $2",
        )
        .bind(message_id)
        .bind(consumer)
        .bind(self.config.lease.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
