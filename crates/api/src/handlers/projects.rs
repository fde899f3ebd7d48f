//! Handlers for projects, nested under orgs for creation and listing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use biopilot_core::error::CoreError;
use biopilot_core::types::DbId;
use biopilot_db::models::project::{CreateProject, Project, UpdateProject};
use biopilot_db::repositories::{FileRepo, OrgRepo, ProjectRepo};
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireWriter;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /orgs/{org_id}/projects`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
}

/// Request body for `PATCH /projects/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
}

/// Load a project or fail with 404.
pub(crate) async fn find_project(pool: &sqlx::PgPool, id: DbId) -> AppResult<Project> {
    ProjectRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Project", id }))
}

/// POST /api/v1/orgs/{org_id}/projects
pub async fn create_project(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
    Json(input): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Project>>)> {
    input.validate()?;
    let project = ProjectRepo::create(
        &state.pool,
        &CreateProject {
            org_id,
            name: input.name,
            description: input.description,
        },
    )
    .await?;
    tracing::info!(project_id = %project.id, %org_id, user_id = %user.user_id, "Project created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// GET /api/v1/orgs/{org_id}/projects
pub async fn list_projects(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Project>>>> {
    if OrgRepo::find_by_id(&state.pool, org_id).await?.is_none() {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Org",
            id: org_id,
        }));
    }
    let projects = ProjectRepo::list_by_org(&state.pool, org_id).await?;
    Ok(Json(DataResponse { data: projects }))
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Project>>> {
    let project = find_project(&state.pool, id).await?;
    Ok(Json(DataResponse { data: project }))
}

/// PATCH /api/v1/projects/{id}
pub async fn update_project(
    RequireWriter(_user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProjectRequest>,
) -> AppResult<Json<DataResponse<Project>>> {
    input.validate()?;
    let update = UpdateProject {
        name: input.name,
        description: input.description,
    };
    let project = ProjectRepo::update(&state.pool, id, &update)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Project", id }))?;
    Ok(Json(DataResponse { data: project }))
}

/// DELETE /api/v1/projects/{id}
///
/// Removes the project with its files, jobs and embeddings. Stored objects
/// of the deleted files are removed afterwards; failures there are logged
/// and leave orphaned objects only.
pub async fn delete_project(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let files = FileRepo::list_by_project(&state.pool, id).await?;

    if !ProjectRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "Project", id }));
    }
    tracing::info!(project_id = %id, user_id = %user.user_id, files = files.len(), "Project deleted");

    for file in files {
        if let Err(e) = state.storage.delete(&file.storage_key).await {
            tracing::warn!(file_id = %file.id, key = %file.storage_key, error = %e, "Failed to delete stored object");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
