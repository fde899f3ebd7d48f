//! Periodic re-enqueue of jobs stuck in PENDING.
//!
//! A job stays PENDING when its enqueue failed or the submitting process
//! died between create and enqueue. Enqueue is idempotent per job, so a
//! sweep that races a slow submitter is harmless.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;

/// Maximum jobs re-enqueued per sweep.
const SWEEP_LIMIT: i64 = 500;

pub struct Reconciler {
    dispatcher: Dispatcher,
    interval: Duration,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(dispatcher: Dispatcher, interval: Duration, stale_after: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            stale_after,
        }
    }

    /// One sweep. Returns how many jobs were handed to the queue.
    pub async fn sweep(&self) -> usize {
        match self.dispatcher.reconcile_pending(self.stale_after, SWEEP_LIMIT).await {
            Ok(0) => {
                tracing::debug!("Reconciliation: no stale PENDING jobs");
                0
            }
            Ok(requeued) => {
                tracing::info!(requeued, "Reconciliation: re-enqueued stale PENDING jobs");
                requeued
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation sweep failed");
                0
            }
        }
    }

    /// Run sweeps until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Reconciler started",
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reconciler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}
