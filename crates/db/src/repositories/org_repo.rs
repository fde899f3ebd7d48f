//! Repository for the `orgs` table.

use biopilot_core::error::CoreError;
use biopilot_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::org::{CreateOrg, Org};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, owner_user_id, created_at, updated_at";

/// Provides CRUD operations for orgs.
pub struct OrgRepo;

impl OrgRepo {
    /// Insert a new org. Fails with `NotFound` if the owner does not exist.
    pub async fn create(pool: &PgPool, input: &CreateOrg) -> Result<Org, StoreError> {
        let query = format!(
            "INSERT INTO orgs (id, name, owner_user_id) \
             SELECT $1, $2, u.id FROM users u WHERE u.id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Org>(&query)
            .bind(new_id())
            .bind(&input.name)
            .bind(input.owner_user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::Core(CoreError::NotFound {
                entity: "User",
                id: input.owner_user_id,
            }))
    }

    /// Find an org by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Org>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orgs WHERE id = $1");
        sqlx::query_as::<_, Org>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List orgs owned by a user, oldest first.
    pub async fn list_by_owner(pool: &PgPool, owner_user_id: DbId) -> Result<Vec<Org>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM orgs WHERE owner_user_id = $1 ORDER BY created_at ASC");
        sqlx::query_as::<_, Org>(&query)
            .bind(owner_user_id)
            .fetch_all(pool)
            .await
    }

    /// List all orgs (admin view), oldest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Org>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orgs ORDER BY created_at ASC");
        sqlx::query_as::<_, Org>(&query).fetch_all(pool).await
    }

    /// Permanently delete an org together with its projects.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orgs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
