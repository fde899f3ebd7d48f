//! Synchronous entry point for job submission.
//!
//! Submission is create (PENDING) → enqueue → QUEUED. A job whose enqueue
//! fails stays PENDING and is picked up again by the [`crate::Reconciler`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use biopilot_core::backoff::{retry_with_backoff, BackoffConfig};
use biopilot_core::error::CoreError;
use biopilot_core::job_status::JobStatus;
use biopilot_core::types::DbId;
use biopilot_db::models::job::{Job, NewJob, TransitionFields};
use biopilot_db::repositories::JobRepo;
use biopilot_db::StoreError;
use biopilot_pipeline::WorkloadRegistry;
use biopilot_queue::{QueueError, TaskMessage, TaskQueue};
use sqlx::PgPool;

use crate::error::WorkerError;

#[derive(Clone)]
pub struct Dispatcher {
    pool: PgPool,
    queue: Arc<dyn TaskQueue>,
    job_types: Arc<BTreeSet<String>>,
    backoff: BackoffConfig,
}

impl Dispatcher {
    pub fn new<I, S>(pool: PgPool, queue: Arc<dyn TaskQueue>, job_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pool,
            queue,
            job_types: Arc::new(job_types.into_iter().map(Into::into).collect()),
            backoff: BackoffConfig::default(),
        }
    }

    /// Accept exactly the job types known to `registry`.
    pub fn for_registry(pool: PgPool, queue: Arc<dyn TaskQueue>, registry: &WorkloadRegistry) -> Self {
        Self::new(pool, queue, registry.job_types())
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Registered job type names, sorted.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.job_types.iter().map(String::as_str)
    }

    fn ensure_known(&self, job_type: &str) -> Result<(), CoreError> {
        if self.job_types.contains(job_type) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!("Unknown job type '{job_type}'")))
        }
    }

    /// Create a job and put it on the queue.
    ///
    /// Unknown job types are rejected before anything is written. The
    /// returned job is QUEUED, or PENDING if the enqueue failed.
    pub async fn submit(
        &self,
        project_id: DbId,
        job_type: &str,
        parameters: serde_json::Value,
    ) -> Result<Job, WorkerError> {
        self.ensure_known(job_type)?;
        let input = NewJob::new(project_id, job_type, parameters);
        let job = self.create(&input).await?;
        tracing::info!(job_id = %job.id, %project_id, job_type, "Job submitted");
        self.enqueue(job, Duration::ZERO).await
    }

    /// Create a fresh attempt of a FAILED job and enqueue it after `delay`.
    pub async fn retry(&self, job_id: DbId, delay: Duration) -> Result<Job, WorkerError> {
        let failed = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id: job_id })?;
        self.resubmit(&failed, delay).await
    }

    /// Like [`Dispatcher::retry`] for an already loaded job.
    pub async fn resubmit(&self, failed: &Job, delay: Duration) -> Result<Job, WorkerError> {
        if failed.status != JobStatus::Failed {
            return Err(CoreError::Conflict(format!(
                "Only FAILED jobs can be retried; job {} is {}",
                failed.id, failed.status
            ))
            .into());
        }
        self.ensure_known(&failed.job_type)?;

        let input = NewJob {
            project_id: failed.project_id,
            job_type: failed.job_type.clone(),
            parameters: failed.parameters.clone(),
            retry_of_job_id: Some(failed.id),
            attempt: failed.attempt + 1,
        };
        let job = self.create(&input).await?;
        tracing::info!(
            job_id = %job.id,
            retry_of = %failed.id,
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            "Job retry submitted",
        );
        self.enqueue(job, delay).await
    }

    /// Re-enqueue PENDING jobs older than `older_than`. Returns how many
    /// were handed to the queue.
    pub async fn reconcile_pending(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> Result<usize, WorkerError> {
        let stale = JobRepo::stale_pending(&self.pool, older_than.as_secs() as i64, limit).await?;
        let mut requeued = 0;
        for job in stale {
            let job_id = job.id;
            match self.enqueue(job, Duration::ZERO).await {
                Ok(job) if job.status != JobStatus::Pending => requeued += 1,
                Ok(_) => tracing::warn!(%job_id, "Reconciliation could not enqueue job"),
                Err(e) => tracing::error!(%job_id, error = %e, "Reconciliation failed for job"),
            }
        }
        Ok(requeued)
    }

    async fn create(&self, input: &NewJob) -> Result<Job, StoreError> {
        retry_with_backoff("create job", &self.backoff, StoreError::is_transient, || {
            JobRepo::create(&self.pool, input)
        })
        .await
    }

    /// Enqueue a PENDING job's task and mark it QUEUED.
    async fn enqueue(&self, job: Job, delay: Duration) -> Result<Job, WorkerError> {
        let message = TaskMessage::new(job.id, job.job_type.clone(), job.parameters.clone());
        let enqueued = retry_with_backoff("enqueue task", &self.backoff, QueueError::is_transient, || {
            self.queue.enqueue_delayed(&message, delay)
        })
        .await;

        if let Err(e) = enqueued {
            tracing::warn!(
                job_id = %job.id,
                error = %e,
                "Enqueue failed, job left PENDING for reconciliation",
            );
            return Ok(job);
        }

        let fields = TransitionFields::default();
        let queued = retry_with_backoff("mark job queued", &self.backoff, StoreError::is_transient, || {
            JobRepo::transition(&self.pool, job.id, JobStatus::Queued, &fields)
        })
        .await;

        match queued {
            Ok(job) => Ok(job),
            // A worker already took the message and moved the job on.
            Err(StoreError::Core(CoreError::InvalidTransition { .. })) => {
                Ok(JobRepo::find_by_id(&self.pool, job.id).await?.unwrap_or(job))
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Task enqueued but job still PENDING; the worker will advance it",
                );
                Ok(job)
            }
            Err(e) => Err(e.into()),
        }
    }
}
