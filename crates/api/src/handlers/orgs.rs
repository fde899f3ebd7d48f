//! Handlers for the `/orgs` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use biopilot_core::error::CoreError;
use biopilot_core::types::DbId;
use biopilot_db::models::org::{CreateOrg, Org};
use biopilot_db::repositories::OrgRepo;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireWriter;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /orgs`. The caller becomes the owner.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrgRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

/// POST /api/v1/orgs
pub async fn create_org(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Json(input): Json<CreateOrgRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Org>>)> {
    input.validate()?;
    let org = OrgRepo::create(
        &state.pool,
        &CreateOrg {
            name: input.name,
            owner_user_id: user.user_id,
        },
    )
    .await?;
    tracing::info!(org_id = %org.id, owner = %user.user_id, "Org created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: org })))
}

/// GET /api/v1/orgs
///
/// Admins see every org; everyone else sees the orgs they own.
pub async fn list_orgs(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Org>>>> {
    let orgs = if auth.role.is_admin() {
        OrgRepo::list_all(&state.pool).await?
    } else {
        OrgRepo::list_by_owner(&state.pool, auth.user_id).await?
    };
    Ok(Json(DataResponse { data: orgs }))
}

/// GET /api/v1/orgs/{id}
pub async fn get_org(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Org>>> {
    let org = OrgRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Org", id }))?;
    Ok(Json(DataResponse { data: org }))
}

/// DELETE /api/v1/orgs/{id}
///
/// Cascades to the org's projects and everything under them.
pub async fn delete_org(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !OrgRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "Org", id }));
    }
    tracing::info!(org_id = %id, user_id = %user.user_id, "Org deleted");
    Ok(StatusCode::NO_CONTENT)
}
