//! Repository for the `files` table.

use biopilot_core::error::CoreError;
use biopilot_core::types::DbId;
use sqlx::PgPool;

use crate::error::{is_unique_violation, StoreError};
use crate::models::file::{CreateFile, File};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, project_id, storage_key, filename, file_type, size_bytes, uploaded_by, uploaded_at";

/// Provides CRUD operations for uploaded files.
pub struct FileRepo;

impl FileRepo {
    /// Record a completed upload.
    ///
    /// Fails with `NotFound` if the project does not exist and `Conflict`
    /// if the storage key is already taken.
    pub async fn create(pool: &PgPool, input: &CreateFile) -> Result<File, StoreError> {
        if input.size_bytes < 0 {
            return Err(StoreError::Core(CoreError::Validation(
                "File size must not be negative".into(),
            )));
        }

        let query = format!(
            "INSERT INTO files \
                 (id, project_id, storage_key, filename, file_type, size_bytes, uploaded_by) \
             SELECT $1, p.id, $3, $4, $5, $6, $7 FROM projects p WHERE p.id = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, File>(&query)
            .bind(input.id)
            .bind(input.project_id)
            .bind(&input.storage_key)
            .bind(&input.filename)
            .bind(&input.file_type)
            .bind(input.size_bytes)
            .bind(input.uploaded_by)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Core(CoreError::Conflict(format!(
                        "Storage key '{}' is already in use",
                        input.storage_key
                    )))
                } else {
                    StoreError::Database(e)
                }
            })?;

        row.ok_or(StoreError::Core(CoreError::NotFound {
            entity: "Project",
            id: input.project_id,
        }))
    }

    /// Find a file by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<File>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM files WHERE id = $1");
        sqlx::query_as::<_, File>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a project's files, most recent upload first.
    pub async fn list_by_project(pool: &PgPool, project_id: DbId) -> Result<Vec<File>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM files WHERE project_id = $1 ORDER BY uploaded_at DESC"
        );
        sqlx::query_as::<_, File>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Permanently delete a file record and its embeddings.
    ///
    /// The stored object is not touched; callers remove it separately.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
