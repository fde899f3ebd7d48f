//! Repository for the `projects` table.

use biopilot_core::error::CoreError;
use biopilot_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::project::{CreateProject, Project, UpdateProject};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, org_id, name, description, created_at, updated_at";

/// Provides CRUD operations for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project. Fails with `NotFound` if the org does not exist.
    pub async fn create(pool: &PgPool, input: &CreateProject) -> Result<Project, StoreError> {
        let query = format!(
            "INSERT INTO projects (id, org_id, name, description) \
             SELECT $1, o.id, $3, $4 FROM orgs o WHERE o.id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(new_id())
            .bind(input.org_id)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::Core(CoreError::NotFound {
                entity: "Org",
                id: input.org_id,
            }))
    }

    /// Find a project by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List an org's projects, most recently created first.
    pub async fn list_by_org(pool: &PgPool, org_id: DbId) -> Result<Vec<Project>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM projects WHERE org_id = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Project>(&query)
            .bind(org_id)
            .fetch_all(pool)
            .await
    }

    /// Update a project. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProject,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_optional(pool)
            .await
    }

    /// Permanently delete a project. Its files, jobs and (through files)
    /// embeddings go with it. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
