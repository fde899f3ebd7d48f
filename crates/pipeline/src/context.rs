//! Everything a workload gets to see while it runs.

use std::sync::Arc;

use biopilot_core::job_log::{LEVEL_ERROR, LEVEL_INFO, LEVEL_WARN};
use biopilot_core::types::DbId;
use biopilot_db::repositories::JobRepo;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::embedder::Embedder;
use crate::error::WorkloadError;
use crate::storage::StorageBackend;

/// Shared services injected into every workload run.
#[derive(Clone)]
pub struct WorkloadServices {
    pub pool: PgPool,
    pub storage: StorageBackend,
    pub embedder: Arc<dyn Embedder>,
}

/// Log sink appending to a job's log in the job store.
///
/// Append failures are reported through `tracing` and otherwise ignored so
/// that a flaky log write never fails the job itself.
#[derive(Clone)]
pub struct JobLog {
    pool: PgPool,
    job_id: DbId,
}

impl JobLog {
    pub fn new(pool: PgPool, job_id: DbId) -> Self {
        Self { pool, job_id }
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.append(LEVEL_INFO, message.as_ref()).await;
    }

    pub async fn warn(&self, message: impl AsRef<str>) {
        self.append(LEVEL_WARN, message.as_ref()).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        self.append(LEVEL_ERROR, message.as_ref()).await;
    }

    async fn append(&self, level: &str, message: &str) {
        if let Err(e) = JobRepo::append_log(&self.pool, self.job_id, level, message).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to append job log entry");
        }
    }
}

/// Per-run context handed to [`crate::Workload::run`].
#[derive(Clone)]
pub struct WorkloadContext {
    pub job_id: DbId,
    pub project_id: DbId,
    pub job_type: String,
    /// 1 for the first attempt, incremented on each retry.
    pub attempt: i32,
    pub parameters: serde_json::Value,
    pub log: JobLog,
    pub services: WorkloadServices,
    cancel: CancellationToken,
}

impl WorkloadContext {
    pub fn new(
        job: &biopilot_db::models::job::Job,
        services: WorkloadServices,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job.id,
            project_id: job.project_id,
            job_type: job.job_type.clone(),
            attempt: job.attempt,
            parameters: job.parameters.clone(),
            log: JobLog::new(services.pool.clone(), job.id),
            services,
            cancel,
        }
    }

    /// Deserialize the job parameters into a typed struct.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, WorkloadError> {
        let raw = if self.parameters.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.parameters.clone()
        };
        serde_json::from_value(raw).map_err(|e| WorkloadError::InvalidParameters(e.to_string()))
    }

    /// Fired on the soft time limit or when cancellation is requested.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the run should stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Err(Cancelled)` if the run should stop.
    pub fn check_cancelled(&self) -> Result<(), WorkloadError> {
        if self.cancel.is_cancelled() {
            Err(WorkloadError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: std::time::Duration) -> Result<(), WorkloadError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(WorkloadError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
