//! Handlers for job submission and the job query API.
//!
//! Submission goes through the [`Dispatcher`](biopilot_worker::Dispatcher);
//! every other endpoint is a read or a flag on the job store. Status only
//! ever changes inside the workers.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use biopilot_core::error::CoreError;
use biopilot_core::job_status::JobStatus;
use biopilot_core::types::{DbId, Timestamp};
use biopilot_db::models::job::{Job, JobListQuery, JobLogEntry, JobRecord};
use biopilot_db::repositories::JobRepo;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::projects::find_project;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireWriter;
use crate::query::JobFilterParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /projects/{project_id}/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// Response for submission and retry: where the job stands right now.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub id: DbId,
    pub status: JobStatus,
    pub job_type: String,
    pub attempt: i32,
    pub retry_of_job_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl From<Job> for JobAccepted {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            job_type: job.job_type,
            attempt: job.attempt,
            retry_of_job_id: job.retry_of_job_id,
            created_at: job.created_at,
        }
    }
}

/// Query parameters for `POST /jobs/{id}/retry`.
#[derive(Debug, Default, Deserialize)]
pub struct RetryParams {
    /// Delay before the new attempt becomes visible to workers.
    #[serde(default)]
    pub delay_secs: u64,
}

fn job_not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: "Job", id })
}

/// POST /api/v1/projects/{project_id}/jobs
///
/// Returns 201 with the job in QUEUED, or in PENDING when the queue was
/// unreachable (the job is re-enqueued later by the reconciliation sweep).
pub async fn submit_job(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<JobAccepted>>)> {
    let parameters = match input.parameters {
        None | Some(serde_json::Value::Null) => serde_json::json!({}),
        Some(value @ serde_json::Value::Object(_)) => value,
        Some(_) => {
            return Err(AppError::Core(CoreError::Validation(
                "Job parameters must be a JSON object".into(),
            )))
        }
    };

    let job = state
        .dispatcher
        .submit(project_id, &input.job_type, parameters)
        .await?;

    tracing::info!(
        job_id = %job.id,
        %project_id,
        job_type = %job.job_type,
        status = %job.status,
        user_id = %user.user_id,
        "Job accepted",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: job.into() })))
}

/// GET /api/v1/projects/{project_id}/jobs
///
/// Newest first. Supports `status`, `limit` and `offset`.
pub async fn list_project_jobs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Query(params): Query<JobFilterParams>,
) -> AppResult<Json<DataResponse<Vec<Job>>>> {
    find_project(&state.pool, project_id).await?;
    let query = JobListQuery {
        project_id: Some(project_id),
        status: params.status,
        limit: params.limit,
        offset: params.offset,
    };
    let jobs = JobRepo::list(&state.pool, &query).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs
///
/// Cross-project listing for operators. Supports `project_id`, `status`,
/// `limit` and `offset`.
pub async fn list_jobs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<JobFilterParams>,
) -> AppResult<Json<DataResponse<Vec<Job>>>> {
    let query = JobListQuery {
        project_id: params.project_id,
        status: params.status,
        limit: params.limit,
        offset: params.offset,
    };
    let jobs = JobRepo::list(&state.pool, &query).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
///
/// Status, timestamps, rendered log text and result key.
pub async fn get_job(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobRecord>>> {
    let record = JobRepo::get(&state.pool, id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/jobs/{id}/logs
///
/// Structured log entries in append order.
pub async fn get_job_logs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<JobLogEntry>>>> {
    if JobRepo::find_by_id(&state.pool, id).await?.is_none() {
        return Err(job_not_found(id));
    }
    let entries = JobRepo::logs(&state.pool, id).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Flags the job for cancellation and returns 202 with the job. The worker
/// holding it (or the next one to claim it) records the FAILED status.
/// Returns 409 if the job is already terminal.
pub async fn cancel_job(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<Job>>)> {
    if !JobRepo::request_cancel(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::Conflict(
            "Job is already in a terminal state and cannot be cancelled".into(),
        )));
    }
    let job = JobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| job_not_found(id))?;

    tracing::info!(job_id = %id, status = %job.status, user_id = %user.user_id, "Job cancellation requested");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// POST /api/v1/jobs/{id}/retry
///
/// Creates a new job from a FAILED job's type and parameters. The original
/// stays FAILED; the new one records it in `retry_of_job_id`. Returns 409
/// for jobs that are not FAILED.
pub async fn retry_job(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<RetryParams>,
) -> AppResult<(StatusCode, Json<DataResponse<JobAccepted>>)> {
    let retry = state
        .dispatcher
        .retry(id, Duration::from_secs(params.delay_secs))
        .await?;

    tracing::info!(
        original_job_id = %id,
        new_job_id = %retry.id,
        user_id = %user.user_id,
        "Job retried",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: retry.into() })))
}
