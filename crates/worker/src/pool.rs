//! N independent worker loops sharing one queue.
//!
//! Each loop dequeues one delivery at a time and hands it to the
//! [`TaskExecutor`]. On shutdown a loop stops taking new work but lets the
//! task it is running reach a terminal status first.

use std::sync::Arc;
use std::time::Duration;

use biopilot_queue::TaskQueue;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::executor::{TaskExecutor, TaskOutcome};

/// Pause after a failed dequeue before trying again.
const DEFAULT_ERROR_DELAY: Duration = Duration::from_secs(2);

pub struct WorkerPool {
    executor: Arc<TaskExecutor>,
    queue: Arc<dyn TaskQueue>,
    worker_name: String,
    concurrency: usize,
    error_delay: Duration,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<TaskExecutor>,
        queue: Arc<dyn TaskQueue>,
        worker_name: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            executor,
            queue,
            worker_name: worker_name.into(),
            concurrency: concurrency.max(1),
            error_delay: DEFAULT_ERROR_DELAY,
        }
    }

    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }

    /// Identity of loop `index`, recorded as `claimed_by` on the jobs it runs.
    pub fn worker_id(&self, index: usize) -> String {
        format!("{}-{index}", self.worker_name)
    }

    /// Run all loops until `cancel` fires and in-flight tasks finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_name = %self.worker_name,
            concurrency = self.concurrency,
            "Worker pool started",
        );

        let mut loops = JoinSet::new();
        for index in 0..self.concurrency {
            loops.spawn(worker_loop(
                self.worker_id(index),
                Arc::clone(&self.executor),
                Arc::clone(&self.queue),
                cancel.clone(),
                self.error_delay,
            ));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker loop terminated abnormally");
            }
        }
        tracing::info!(worker_name = %self.worker_name, "Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: String,
    executor: Arc<TaskExecutor>,
    queue: Arc<dyn TaskQueue>,
    cancel: CancellationToken,
    error_delay: Duration,
) {
    tracing::debug!(%worker_id, "Worker loop started");

    loop {
        let delivery = match queue.dequeue(&worker_id, &cancel).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(%worker_id, error = %e, "Dequeue failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(error_delay) => continue,
                }
            }
        };

        let job_id = delivery.message.job_id;
        if delivery.is_redelivery() {
            tracing::info!(%worker_id, %job_id, delivery = delivery.delivery_count, "Redelivered task");
        }

        // Not raced against `cancel`: a started task always gets recorded.
        match executor.handle(&worker_id, delivery).await {
            Ok(TaskOutcome::Discarded { reason, .. }) => {
                tracing::debug!(%worker_id, %job_id, ?reason, "Task discarded");
            }
            Ok(outcome) => tracing::debug!(%worker_id, ?outcome, "Task finished"),
            Err(e) => {
                tracing::error!(%worker_id, %job_id, error = %e, "Task left for redelivery");
            }
        }
    }

    tracing::debug!(%worker_id, "Worker loop stopped");
}
