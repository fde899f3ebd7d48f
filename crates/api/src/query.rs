//! Shared query parameter types for API handlers.

use biopilot_core::job_status::JobStatus;
use biopilot_core::types::DbId;
use serde::Deserialize;

/// Filters for job listings (`?status=&limit=&offset=`).
///
/// `status` is the status name, case-insensitive (e.g. `failed`). Limits
/// are clamped in the repository layer.
#[derive(Debug, Default, Deserialize)]
pub struct JobFilterParams {
    pub project_id: Option<DbId>,
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
