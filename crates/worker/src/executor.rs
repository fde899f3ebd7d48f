//! Per-task protocol run by every worker loop.
//!
//! For one delivery:
//! 1. Load the job and suppress duplicates: a terminal job, or one RUNNING
//!    under a different message, is acked and discarded. A job RUNNING under
//!    this very message was orphaned by a dead worker and is failed with a
//!    stale-claim diagnostic.
//! 2. Claim it (RUNNING) through the row-locked store transition.
//! 3. Run the workload in its own task under the soft and hard limits,
//!    watching for cancellation requests and keeping the queue lease alive.
//!    If the lease is lost anyway the run is abandoned without touching the
//!    job or the message.
//! 4. Record COMPLETED or FAILED, optionally submit a retry, then ack. A run
//!    that was told to stop (soft limit, cancellation) never completes, even
//!    if the workload returns a result.
//!
//! The message is acked only after the terminal status is stored, so a
//! crash anywhere before that leads to redelivery.

use std::sync::Arc;
use std::time::Duration;

use biopilot_core::backoff::{retry_with_backoff, BackoffConfig};
use biopilot_core::error::CoreError;
use biopilot_core::job_log::{
    LEVEL_ERROR, LEVEL_INFO, LEVEL_WARN, MARKER_CANCELLED, MARKER_HARD_TIMEOUT, MARKER_SOFT_TIMEOUT,
    MARKER_STALE_CLAIM, MARKER_WORKLOAD_ERROR,
};
use biopilot_core::job_status::JobStatus;
use biopilot_core::limits::TimeLimits;
use biopilot_core::retry::FailureKind;
use biopilot_core::types::DbId;
use biopilot_db::models::job::{Job, TransitionFields};
use biopilot_db::repositories::JobRepo;
use biopilot_db::StoreError;
use biopilot_pipeline::{Workload, WorkloadContext, WorkloadError, WorkloadRegistry, WorkloadServices};
use biopilot_queue::{Delivery, QueueError, TaskQueue};
use sqlx::PgPool;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::WorkerError;

/// Default interval between cancellation checks while a task runs.
const DEFAULT_CANCEL_POLL: Duration = Duration::from_secs(2);

/// Default interval between lease extensions while a task runs.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub limits: TimeLimits,
    pub cancel_poll_interval: Duration,
    /// Must be comfortably shorter than the queue lease.
    pub heartbeat_interval: Duration,
    /// Backoff for store and queue calls made by the executor itself.
    pub backoff: BackoffConfig,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            limits: TimeLimits::default(),
            cancel_poll_interval: DEFAULT_CANCEL_POLL,
            heartbeat_interval: DEFAULT_HEARTBEAT,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Why a delivery was acked without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The job no longer exists (e.g. its project was deleted).
    JobMissing,
    /// The job already reached this terminal status.
    AlreadyTerminal(JobStatus),
    /// Another message owns the running job.
    RunningElsewhere,
    /// Another worker claimed the job first, or recorded its terminal
    /// status while this one was still running it.
    LostClaim,
    /// The queue lease ran out mid-run and the message went to another
    /// worker; the run was abandoned.
    LeaseLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed {
        job_id: DbId,
        result_key: Option<String>,
    },
    Failed {
        job_id: DbId,
        kind: FailureKind,
        /// Id of the follow-up job if a retry was submitted.
        retried_as: Option<DbId>,
    },
    Discarded {
        job_id: DbId,
        reason: DiscardReason,
    },
}

enum Execution {
    Finished(Result<Option<String>, WorkloadError>),
    Panicked(String),
    HardTimeout,
    LeaseLost,
}

pub struct TaskExecutor {
    pool: PgPool,
    queue: Arc<dyn TaskQueue>,
    registry: Arc<WorkloadRegistry>,
    services: WorkloadServices,
    dispatcher: Dispatcher,
    settings: ExecutorSettings,
}

impl TaskExecutor {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        registry: Arc<WorkloadRegistry>,
        services: WorkloadServices,
        dispatcher: Dispatcher,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            pool: services.pool.clone(),
            queue,
            registry,
            services,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run the full protocol for one delivery on behalf of `worker_id`.
    ///
    /// An `Err` means the terminal status could not be recorded; the
    /// message is left un-acked and will be redelivered.
    pub async fn handle(&self, worker_id: &str, delivery: Delivery) -> Result<TaskOutcome, WorkerError> {
        let job_id = delivery.message.job_id;
        let message_id = delivery.message_id;

        let loaded = retry_with_backoff("load job", &self.settings.backoff, StoreError::is_transient, || async {
            Ok::<_, StoreError>(JobRepo::find_by_id(&self.pool, job_id).await?)
        })
        .await?;

        let Some(job) = loaded else {
            tracing::warn!(%job_id, %message_id, "Task for unknown job, discarding");
            return self.discard(job_id, message_id, DiscardReason::JobMissing).await;
        };

        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                tracing::info!(%job_id, status = %job.status, "Duplicate delivery of finished job");
                return self
                    .discard(job_id, message_id, DiscardReason::AlreadyTerminal(job.status))
                    .await;
            }
            JobStatus::Running if job.claim_message_id == Some(message_id) => {
                let holder = job.claimed_by.as_deref().unwrap_or("unknown worker");
                tracing::warn!(%job_id, holder, delivery = delivery.delivery_count, "Stale claim");
                let diagnostic = format!(
                    "{MARKER_STALE_CLAIM} {holder} stopped before finishing; \
                     redelivered as delivery {}",
                    delivery.delivery_count
                );
                return self.fail(&job, message_id, FailureKind::StaleClaim, diagnostic).await;
            }
            JobStatus::Running => {
                tracing::info!(%job_id, "Job already running under another message");
                return self.discard(job_id, message_id, DiscardReason::RunningElsewhere).await;
            }
            JobStatus::Pending => {
                // The dispatcher enqueued but never marked the job QUEUED.
                match self.transition(job_id, JobStatus::Queued, &TransitionFields::default()).await {
                    Ok(_) | Err(StoreError::Core(CoreError::InvalidTransition { .. })) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            JobStatus::Queued => {}
        }

        let claim = TransitionFields::claim(worker_id, message_id);
        let job = match self.transition(job_id, JobStatus::Running, &claim).await {
            Ok(job) => job,
            Err(StoreError::Core(CoreError::InvalidTransition { from, .. })) => {
                tracing::info!(%job_id, %from, worker_id, "Lost claim race");
                return self.discard(job_id, message_id, DiscardReason::LostClaim).await;
            }
            Err(e) => return Err(e.into()),
        };
        self.append_log(
            job_id,
            LEVEL_INFO,
            &format!("claimed by {worker_id} (delivery {})", delivery.delivery_count),
        )
        .await;

        if job.cancel_requested_at.is_some() {
            let diagnostic = format!("{MARKER_CANCELLED} cancellation requested before start");
            return self.fail(&job, message_id, FailureKind::Cancelled, diagnostic).await;
        }

        let Some(entry) = self.registry.get(&job.job_type) else {
            let diagnostic = format!(
                "{MARKER_WORKLOAD_ERROR} no workload registered for job type '{}'",
                job.job_type
            );
            return self.fail(&job, message_id, FailureKind::Workload, diagnostic).await;
        };

        tracing::info!(%job_id, job_type = %job.job_type, worker_id, "Executing job");
        let workload = Arc::clone(&entry.workload);
        let (execution, stop) = self.execute(worker_id, message_id, &job, workload).await;
        let limits = self.settings.limits;

        match execution {
            Execution::Finished(Ok(result_key)) => match stop {
                None => self.complete(&job, message_id, result_key).await,
                // The workload ignored the stop signal; its result is discarded.
                Some(FailureKind::SoftTimeout) => {
                    let diagnostic = format!(
                        "{MARKER_SOFT_TIMEOUT} soft time limit of {:?} exceeded; \
                         workload finished late and its result was discarded",
                        limits.soft
                    );
                    self.fail(&job, message_id, FailureKind::SoftTimeout, diagnostic).await
                }
                Some(kind) => {
                    let diagnostic = format!(
                        "{MARKER_CANCELLED} cancellation requested; \
                         workload finished anyway and its result was discarded"
                    );
                    self.fail(&job, message_id, kind, diagnostic).await
                }
            },
            Execution::Finished(Err(e)) => {
                let kind = stop.unwrap_or(FailureKind::Workload);
                let diagnostic = match kind {
                    FailureKind::SoftTimeout => format!(
                        "{MARKER_SOFT_TIMEOUT} soft time limit of {:?} exceeded: {e}",
                        limits.soft
                    ),
                    FailureKind::Cancelled => format!("{MARKER_CANCELLED} {e}"),
                    _ => format!("{MARKER_WORKLOAD_ERROR} {e}"),
                };
                self.fail(&job, message_id, kind, diagnostic).await
            }
            Execution::Panicked(detail) => {
                let diagnostic = format!("{MARKER_WORKLOAD_ERROR} workload panicked: {detail}");
                self.fail(&job, message_id, FailureKind::Workload, diagnostic).await
            }
            Execution::HardTimeout => {
                let diagnostic = format!(
                    "{MARKER_HARD_TIMEOUT} execution aborted at hard time limit of {:?}",
                    limits.hard
                );
                self.fail(&job, message_id, FailureKind::HardTimeout, diagnostic).await
            }
            Execution::LeaseLost => {
                // The message belongs to whoever holds it now: no ack, no
                // status change.
                self.append_log(
                    job_id,
                    LEVEL_WARN,
                    &format!("{worker_id} lost its queue lease and abandoned the run"),
                )
                .await;
                Ok(TaskOutcome::Discarded {
                    job_id,
                    reason: DiscardReason::LeaseLost,
                })
            }
        }
    }

    /// Run the workload in its own task so the hard limit can abort it.
    ///
    /// Returns how execution ended and, if the run was asked to stop early,
    /// why.
    async fn execute(
        &self,
        worker_id: &str,
        message_id: DbId,
        job: &Job,
        workload: Arc<dyn Workload>,
    ) -> (Execution, Option<FailureKind>) {
        let cancel = CancellationToken::new();
        let ctx = WorkloadContext::new(job, self.services.clone(), cancel.clone());
        let mut handle = tokio::spawn(async move { workload.run(&ctx).await });

        let limits = self.settings.limits;
        let soft = tokio::time::sleep(limits.soft);
        let hard = tokio::time::sleep(limits.hard);
        tokio::pin!(soft, hard);

        let poll_every = self.settings.cancel_poll_interval;
        let mut cancel_poll = interval_at(Instant::now() + poll_every, poll_every);
        cancel_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let beat_every = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + beat_every, beat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stop: Option<FailureKind> = None;

        let execution = loop {
            tokio::select! {
                joined = &mut handle => {
                    break match joined {
                        Ok(result) => Execution::Finished(result),
                        Err(e) => Execution::Panicked(e.to_string()),
                    };
                }
                _ = &mut hard => {
                    handle.abort();
                    tracing::warn!(job_id = %job.id, limit = ?limits.hard, "Hard time limit reached, aborting");
                    break Execution::HardTimeout;
                }
                _ = &mut soft, if stop.is_none() => {
                    tracing::warn!(job_id = %job.id, limit = ?limits.soft, "Soft time limit reached, signalling workload");
                    stop = Some(FailureKind::SoftTimeout);
                    cancel.cancel();
                }
                _ = cancel_poll.tick(), if stop.is_none() => {
                    match JobRepo::is_cancel_requested(&self.pool, job.id).await {
                        Ok(true) => {
                            tracing::info!(job_id = %job.id, "Cancellation requested, signalling workload");
                            stop = Some(FailureKind::Cancelled);
                            cancel.cancel();
                        }
                        Ok(false) => {}
                        Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Cancellation check failed"),
                    }
                }
                _ = heartbeat.tick() => {
                    match self.queue.extend_lease(message_id, worker_id).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::warn!(job_id = %job.id, %message_id, worker_id, "Queue lease lost while running, abandoning");
                            cancel.cancel();
                            handle.abort();
                            break Execution::LeaseLost;
                        }
                        Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Lease heartbeat failed"),
                    }
                }
            }
        };

        (execution, stop)
    }

    async fn complete(
        &self,
        job: &Job,
        message_id: DbId,
        result_key: Option<String>,
    ) -> Result<TaskOutcome, WorkerError> {
        let fields = TransitionFields {
            result_s3_key: result_key.clone(),
            ..Default::default()
        };
        let done = match self.transition(job.id, JobStatus::Completed, &fields).await {
            Ok(done) => done,
            Err(StoreError::Core(CoreError::InvalidTransition { from, .. })) => {
                return Ok(self.ownership_lost(job.id, from));
            }
            Err(e) => return Err(e.into()),
        };
        self.append_log(
            job.id,
            LEVEL_INFO,
            &match &result_key {
                Some(key) => format!("completed, result at {key}"),
                None => "completed".to_string(),
            },
        )
        .await;
        tracing::info!(
            job_id = %job.id,
            result_key = ?done.result_s3_key,
            "Job completed",
        );
        self.ack(message_id).await?;
        Ok(TaskOutcome::Completed {
            job_id: job.id,
            result_key,
        })
    }

    /// Log the diagnostic, record FAILED, submit a retry if the policy
    /// allows, then ack.
    async fn fail(
        &self,
        job: &Job,
        message_id: DbId,
        kind: FailureKind,
        diagnostic: String,
    ) -> Result<TaskOutcome, WorkerError> {
        self.append_log(job.id, LEVEL_ERROR, &diagnostic).await;
        let failed = match self
            .transition(job.id, JobStatus::Failed, &TransitionFields::default())
            .await
        {
            Ok(failed) => failed,
            Err(StoreError::Core(CoreError::InvalidTransition { from, .. })) => {
                return Ok(self.ownership_lost(job.id, from));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::warn!(job_id = %job.id, ?kind, "Job failed");

        let retried_as = self.maybe_retry(&failed, kind).await;
        self.ack(message_id).await?;
        Ok(TaskOutcome::Failed {
            job_id: job.id,
            kind,
            retried_as,
        })
    }

    async fn maybe_retry(&self, failed: &Job, kind: FailureKind) -> Option<DbId> {
        let policy = self.registry.retry_policy(&failed.job_type);
        let attempt = failed.attempt.max(1) as u32;
        if !policy.should_retry(attempt, kind) {
            return None;
        }
        let delay = policy.delay_before(attempt + 1);
        match self.dispatcher.resubmit(failed, delay).await {
            Ok(retry) => {
                self.append_log(
                    failed.id,
                    LEVEL_INFO,
                    &format!("retry scheduled as job {} (attempt {})", retry.id, retry.attempt),
                )
                .await;
                Some(retry.id)
            }
            Err(e) => {
                tracing::error!(job_id = %failed.id, error = %e, "Failed to submit retry");
                None
            }
        }
    }

    /// Someone else already finished the job. The message is left alone:
    /// if it is still ours, redelivery discards it as a duplicate.
    fn ownership_lost(&self, job_id: DbId, status: JobStatus) -> TaskOutcome {
        tracing::warn!(%job_id, %status, "Job finished elsewhere, dropping own result");
        TaskOutcome::Discarded {
            job_id,
            reason: DiscardReason::LostClaim,
        }
    }

    async fn discard(
        &self,
        job_id: DbId,
        message_id: DbId,
        reason: DiscardReason,
    ) -> Result<TaskOutcome, WorkerError> {
        self.ack(message_id).await?;
        Ok(TaskOutcome::Discarded { job_id, reason })
    }

    async fn transition(
        &self,
        job_id: DbId,
        next: JobStatus,
        fields: &TransitionFields,
    ) -> Result<Job, StoreError> {
        retry_with_backoff("job transition", &self.settings.backoff, StoreError::is_transient, || {
            JobRepo::transition(&self.pool, job_id, next, fields)
        })
        .await
    }

    async fn ack(&self, message_id: DbId) -> Result<(), QueueError> {
        retry_with_backoff("ack task", &self.settings.backoff, QueueError::is_transient, || {
            self.queue.ack(message_id)
        })
        .await
    }

    /// Append to the job log; failures are reported but never fatal.
    async fn append_log(&self, job_id: DbId, level: &str, text: &str) {
        let appended = retry_with_backoff("append job log", &self.settings.backoff, StoreError::is_transient, || {
            JobRepo::append_log(&self.pool, job_id, level, text)
        })
        .await;
        if let Err(e) = appended {
            tracing::error!(%job_id, error = %e, "Failed to append job log entry");
        }
    }
}
