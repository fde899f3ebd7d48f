//! Org entity model and DTOs.

use biopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `orgs` table. The owner never changes after creation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Org {
    pub id: DbId,
    pub name: String,
    pub owner_user_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating an org.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrg {
    pub name: String,
    pub owner_user_id: DbId,
}
