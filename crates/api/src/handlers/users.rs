//! Handlers for the `/users` resource.
//!
//! Creating and deleting accounts is admin-only; any authenticated user may
//! look an account up.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use biopilot_core::error::CoreError;
use biopilot_core::roles::UserRole;
use biopilot_core::types::DbId;
use biopilot_db::models::user::{CreateUser, UserResponse};
use biopilot_db::repositories::UserRepo;
use serde::Deserialize;
use validator::Validate;

use crate::auth::password::{hash_password, MIN_PASSWORD_LENGTH};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /users`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = MIN_PASSWORD_LENGTH, max = 256))]
    pub password: String,
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

/// POST /api/v1/users
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<UserResponse>>)> {
    input.validate()?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let user = UserRepo::create(
        &state.pool,
        &CreateUser {
            email: input.email,
            password_hash,
            name: input.name,
            role: input.role,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, admin_id = %admin.user_id, "User created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: user.into() })))
}

/// GET /api/v1/users/{id}
pub async fn get_user(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = UserRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;
    Ok(Json(DataResponse { data: user.into() }))
}

/// DELETE /api/v1/users/{id}
///
/// Returns 409 while the user still owns an org. Files the user uploaded
/// are kept with no uploader.
pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !UserRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "User", id }));
    }
    tracing::info!(user_id = %id, admin_id = %admin.user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
