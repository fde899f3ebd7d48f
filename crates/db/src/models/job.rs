//! Job entity models and DTOs for the orchestration core.

use biopilot_core::job_status::JobStatus;
use biopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project_id: DbId,
    pub job_type: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: JobStatus,
    pub parameters: serde_json::Value,
    pub result_s3_key: Option<String>,
    pub attempt: i32,
    pub retry_of_job_id: Option<DbId>,
    pub claimed_by: Option<String>,
    pub claim_message_id: Option<DbId>,
    pub cancel_requested_at: Option<Timestamp>,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Whether the snapshot satisfies the timestamp invariants.
    pub fn timestamps_consistent(&self) -> bool {
        biopilot_core::job_status::timestamps_consistent(
            self.status,
            self.started_at.is_some(),
            self.finished_at.is_some(),
        )
    }
}

/// A row from the `job_log_entries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobLogEntry {
    pub id: i64,
    pub job_id: DbId,
    pub level: String,
    pub message: String,
    pub logged_at: Timestamp,
}

/// Snapshot returned by the job query API: the job plus its rendered log.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    #[serde(flatten)]
    pub job: Job,
    /// All log entries joined in order, `None` when the log is empty.
    pub logs: Option<String>,
}

/// Input for creating a job in PENDING.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub project_id: DbId,
    pub job_type: String,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    /// Set when this job retries a failed one.
    #[serde(default)]
    pub retry_of_job_id: Option<DbId>,
    /// 1 for a first attempt.
    #[serde(default = "first_attempt")]
    pub attempt: i32,
}

impl NewJob {
    pub fn new(project_id: DbId, job_type: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            project_id,
            job_type: job_type.into(),
            parameters,
            retry_of_job_id: None,
            attempt: 1,
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

fn first_attempt() -> i32 {
    1
}

/// Extra columns written alongside a status transition.
///
/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    /// Result location, only meaningful on COMPLETED.
    pub result_s3_key: Option<String>,
    /// Identity of the worker claiming the job (on RUNNING).
    pub claimed_by: Option<String>,
    /// Queue message that owns the job (on RUNNING).
    pub claim_message_id: Option<DbId>,
}

impl TransitionFields {
    pub fn result(key: impl Into<String>) -> Self {
        Self {
            result_s3_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn claim(worker: impl Into<String>, message_id: DbId) -> Self {
        Self {
            claimed_by: Some(worker.into()),
            claim_message_id: Some(message_id),
            ..Default::default()
        }
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Restrict to one project.
    pub project_id: Option<DbId>,
    /// Restrict to one status (e.g. `FAILED`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
