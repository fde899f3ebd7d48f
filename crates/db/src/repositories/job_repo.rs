//! Repository for the `jobs` and `job_log_entries` tables.
//!
//! This is the only code allowed to change a job's status. Every status
//! change goes through [`JobRepo::transition`], which locks the row,
//! validates the step against the state machine in `biopilot_core` and
//! stamps the matching timestamp in the same statement.

use biopilot_core::error::CoreError;
use biopilot_core::job_log;
use biopilot_core::job_status::{validate_transition, JobStatus};
use biopilot_core::naming::validate_job_type;
use biopilot_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::job::{
    Job, JobListQuery, JobLogEntry, JobRecord, NewJob, TransitionFields,
};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, project_id, job_type, status_id, parameters, result_s3_key, \
    attempt, retry_of_job_id, claimed_by, claim_message_id, \
    cancel_requested_at, queued_at, started_at, finished_at, \
    created_at, updated_at";

/// Column list for `job_log_entries` queries.
const LOG_COLUMNS: &str = "id, job_id, level, message, logged_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: completed, failed.
const TERMINAL_STATUSES: [i16; 2] = [JobStatus::Completed as i16, JobStatus::Failed as i16];

fn not_found(id: DbId) -> StoreError {
    StoreError::Core(CoreError::NotFound { entity: "Job", id })
}

/// Provides the Job Store operations.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in PENDING.
    ///
    /// Fails with `NotFound` if the project does not exist. The insert and
    /// the existence check are one statement, so a concurrently deleted
    /// project cannot leave an orphan behind.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<Job, StoreError> {
        validate_job_type(&input.job_type)?;

        let query = format!(
            "INSERT INTO jobs \
                 (id, project_id, job_type, status_id, parameters, attempt, retry_of_job_id) \
             SELECT $1, p.id, $3, $4, $5, $6, $7 FROM projects p WHERE p.id = $2 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(new_id())
            .bind(input.project_id)
            .bind(&input.job_type)
            .bind(JobStatus::INITIAL.id())
            .bind(&input.parameters)
            .bind(input.attempt)
            .bind(input.retry_of_job_id)
            .fetch_optional(pool)
            .await?;

        job.ok_or(StoreError::Core(CoreError::NotFound {
            entity: "Project",
            id: input.project_id,
        }))
    }

    /// Apply one state-machine step atomically.
    ///
    /// The row is locked with `SELECT ... FOR UPDATE` for the duration of
    /// the transaction, so two workers racing on a redelivered task are
    /// serialized: the loser sees the winner's status and gets
    /// `InvalidTransition`.
    ///
    /// Side effects per target status:
    /// - QUEUED sets `queued_at`.
    /// - RUNNING sets `started_at` and the claim columns from `fields`.
    /// - COMPLETED / FAILED set `finished_at`; COMPLETED may set `result_s3_key`.
    pub async fn transition(
        pool: &PgPool,
        job_id: DbId,
        next: JobStatus,
        fields: &TransitionFields,
    ) -> Result<Job, StoreError> {
        if fields.result_s3_key.is_some() && next != JobStatus::Completed {
            return Err(StoreError::Core(CoreError::Validation(
                "A result key can only be recorded on COMPLETED".into(),
            )));
        }

        let mut tx = pool.begin().await?;

        let current: Option<i16> =
            sqlx::query_scalar("SELECT status_id FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = JobStatus::try_from(current.ok_or_else(|| not_found(job_id))?)?;

        if let Err(e) = validate_transition(job_id, current, next) {
            tracing::warn!(
                %job_id,
                from = %current,
                to = %next,
                "Rejected job status transition",
            );
            return Err(e.into());
        }

        let stamp = match next {
            JobStatus::Queued => "queued_at = NOW()",
            JobStatus::Running => "started_at = NOW()",
            JobStatus::Completed | JobStatus::Failed => "finished_at = NOW()",
            JobStatus::Pending => {
                return Err(CoreError::InvalidTransition {
                    job_id,
                    from: current,
                    to: next,
                }
                .into())
            }
        };

        let query = format!(
            "UPDATE jobs SET \
                 status_id = $2, {stamp}, \
                 result_s3_key = COALESCE($3, result_s3_key), \
                 claimed_by = COALESCE($4, claimed_by), \
                 claim_message_id = COALESCE($5, claim_message_id) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(next.id())
            .bind(&fields.result_s3_key)
            .bind(&fields.claimed_by)
            .bind(fields.claim_message_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(%job_id, from = %current, to = %next, "Job status transition");
        Ok(job)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Read-only snapshot of a job with its rendered log.
    pub async fn get(pool: &PgPool, id: DbId) -> Result<JobRecord, StoreError> {
        let job = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        let entries = Self::logs(pool, id).await?;
        let logs = job_log::render(
            entries
                .iter()
                .map(|e| (&e.logged_at, e.level.as_str(), e.message.as_str())),
        );
        Ok(JobRecord { job, logs })
    }

    /// Append a log entry without touching the status.
    ///
    /// Entries from one writer keep their call order (the entry id is a
    /// sequence). Fails with `NotFound` if the job does not exist.
    pub async fn append_log(
        pool: &PgPool,
        job_id: DbId,
        level: &str,
        text: &str,
    ) -> Result<JobLogEntry, StoreError> {
        let query = format!(
            "INSERT INTO job_log_entries (job_id, level, message) \
             SELECT j.id, $2, $3 FROM jobs j WHERE j.id = $1 \
             RETURNING {LOG_COLUMNS}"
        );
        sqlx::query_as::<_, JobLogEntry>(&query)
            .bind(job_id)
            .bind(level)
            .bind(job_log::truncate_entry(text))
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    /// All log entries for a job in append order.
    pub async fn logs(pool: &PgPool, job_id: DbId) -> Result<Vec<JobLogEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM job_log_entries WHERE job_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, JobLogEntry>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Flag a non-terminal job for cancellation.
    ///
    /// Returns `true` if the flag is (now) set, `false` if the job is
    /// already terminal. Fails with `NotFound` if the job does not exist.
    pub async fn request_cancel(pool: &PgPool, job_id: DbId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET cancel_requested_at = COALESCE(cancel_requested_at, NOW()) \
             WHERE id = $1 AND status_id NOT IN ($2, $3)",
        )
        .bind(job_id)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match Self::find_by_id(pool, job_id).await? {
            Some(_) => Ok(false),
            None => Err(not_found(job_id)),
        }
    }

    /// Whether cancellation has been requested for a job.
    pub async fn is_cancel_requested(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let flagged: Option<bool> = sqlx::query_scalar(
            "SELECT cancel_requested_at IS NOT NULL FROM jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
        Ok(flagged.unwrap_or(false))
    }

    /// PENDING jobs created more than `older_than_secs` ago, oldest first.
    ///
    /// These are jobs whose enqueue failed (or whose dispatcher died before
    /// flipping them to QUEUED) and are picked up by the reconciliation sweep.
    pub async fn stale_pending(
        pool: &PgPool,
        older_than_secs: i64,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id = $1 AND created_at < NOW() - make_interval(secs => $2) \
             ORDER BY created_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.id())
            .bind(older_than_secs as f64)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List jobs with optional project/status filter and pagination,
    /// newest first.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.project_id.is_some() {
            conditions.push(format!("project_id = ${bind_idx}"));
            bind_idx += 1;
        }

        if params.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Job>(&query);

        if let Some(project_id) = params.project_id {
            q = q.bind(project_id);
        }
        if let Some(status) = params.status {
            q = q.bind(status.id());
        }

        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }
}
