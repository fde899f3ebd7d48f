//! File entity model and DTOs.

use biopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `files` table.
///
/// `storage_key` addresses the object store and is unique system-wide.
/// `uploaded_by` becomes `None` once the uploading user is deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct File {
    pub id: DbId,
    pub project_id: DbId,
    pub storage_key: String,
    pub filename: String,
    /// Format tag such as `"vcf"` or `"fastq"`.
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<DbId>,
    pub uploaded_at: Timestamp,
}

/// DTO for recording a completed upload.
///
/// `id` is chosen by the caller so the storage key can embed it before
/// the row exists.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFile {
    pub id: DbId,
    pub project_id: DbId,
    pub storage_key: String,
    pub filename: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<DbId>,
}
