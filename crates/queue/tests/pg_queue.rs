//! Integration tests for the Postgres task queue.

use std::time::Duration;

use biopilot_core::types::new_id;
use biopilot_queue::{PgQueueConfig, PgTaskQueue, TaskMessage, TaskQueue};
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

fn queue(pool: &PgPool, lease: Duration) -> PgTaskQueue {
    PgTaskQueue::new(
        pool.clone(),
        PgQueueConfig {
            lease,
            poll_interval: Duration::from_millis(20),
        },
    )
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enqueue_dequeue_ack(pool: PgPool) {
    let q = queue(&pool, Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let job_id = new_id();

    let id = q
        .enqueue(&TaskMessage::new(job_id, "demo", json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(q.depth().await.unwrap(), 1);

    let delivery = q.dequeue("w1", &cancel).await.unwrap().unwrap();
    assert_eq!(delivery.message_id, id);
    assert_eq!(delivery.message.job_id, job_id);
    assert_eq!(delivery.message.parameters, json!({"n": 1}));
    assert_eq!(delivery.delivery_count, 1);

    q.ack(id).await.unwrap();
    assert_eq!(q.depth().await.unwrap(), 0);
    // Acking twice is harmless.
    q.ack(id).await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enqueue_is_idempotent_per_job(pool: PgPool) {
    let q = queue(&pool, Duration::from_secs(30));
    let job_id = new_id();
    let msg = TaskMessage::new(job_id, "demo", json!({}));

    let first = q.enqueue(&msg).await.unwrap();
    let second = q.enqueue(&msg).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(q.depth().await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_consumers_never_share_a_message(pool: PgPool) {
    let q = queue(&pool, Duration::from_secs(30));
    let cancel = CancellationToken::new();
    for _ in 0..4 {
        q.enqueue(&TaskMessage::new(new_id(), "demo", json!({})))
            .await
            .unwrap();
    }

    let (a, b, c, d) = tokio::join!(
        q.dequeue("w1", &cancel),
        q.dequeue("w2", &cancel),
        q.dequeue("w3", &cancel),
        q.dequeue("w4", &cancel),
    );
    let mut ids: Vec<_> = [a, b, c, d]
        .into_iter()
        .map(|r| r.unwrap().unwrap().message_id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_expired_lease_redelivers(pool: PgPool) {
    let q = queue(&pool, Duration::from_millis(100));
    let cancel = CancellationToken::new();
    q.enqueue(&TaskMessage::new(new_id(), "demo", json!({})))
        .await
        .unwrap();

    let first = q.dequeue("w1", &cancel).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), q.dequeue("w2", &cancel))
        .await
        .expect("message must come back after the lease expires")
        .unwrap()
        .unwrap();

    assert_eq!(first.message_id, second.message_id);
    assert_eq!(second.delivery_count, 2);
    assert!(second.is_redelivery());

    // The original holder lost the lease.
    assert!(!q.extend_lease(first.message_id, "w1").await.unwrap());
    assert!(q.extend_lease(second.message_id, "w2").await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delayed_and_nacked_messages(pool: PgPool) {
    let q = queue(&pool, Duration::from_secs(30));
    let cancel = CancellationToken::new();
    q.enqueue_delayed(
        &TaskMessage::new(new_id(), "demo", json!({})),
        Duration::from_millis(300),
    )
    .await
    .unwrap();

    let early = tokio::time::timeout(Duration::from_millis(50), q.dequeue("w1", &cancel)).await;
    assert!(early.is_err(), "delayed message must not be visible yet");

    let delivery = tokio::time::timeout(Duration::from_secs(5), q.dequeue("w1", &cancel))
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    q.nack(delivery.message_id, Duration::ZERO).await.unwrap();
    let again = q.dequeue("w2", &cancel).await.unwrap().unwrap();
    assert_eq!(again.message_id, delivery.message_id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dequeue_returns_none_on_cancel(pool: PgPool) {
    let q = queue(&pool, Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let waiter = {
        let q = q.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { q.dequeue("w1", &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = waiter.await.unwrap().unwrap();
    assert!(result.is_none());
}
