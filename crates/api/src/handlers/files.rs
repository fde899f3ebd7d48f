//! Handlers for uploaded files and their embeddings.
//!
//! Upload order is object store first, then the `files` row, so a row
//! never points at a missing object. If the row insert fails the object is
//! removed again on a best-effort basis.
//!
//! `file_type` is a format tag such as `"vcf"` or `"fastq"`, never a MIME
//! type. Downloads are always served as `application/octet-stream`.

use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use biopilot_core::error::CoreError;
use biopilot_core::naming::{
    file_object_key, file_type_from_name, normalize_file_type, sanitize_filename,
};
use biopilot_core::types::{new_id, DbId};
use biopilot_db::models::embedding::EmbeddingSummary;
use biopilot_db::models::file::{CreateFile, File};
use biopilot_db::repositories::{EmbeddingRepo, FileRepo};

use crate::error::{AppError, AppResult};
use crate::handlers::projects::find_project;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireWriter;
use crate::response::DataResponse;
use crate::state::AppState;

const DOWNLOAD_CONTENT_TYPE: &str = "application/octet-stream";

async fn find_file(pool: &sqlx::PgPool, id: DbId) -> AppResult<File> {
    FileRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "File", id }))
}

/// POST /api/v1/projects/{project_id}/files
///
/// Multipart form with a required `file` field and an optional `file_type`
/// text field. Without `file_type` the tag is derived from the filename's
/// extension. Returns 201 with the file record, including its id and
/// storage key.
pub async fn upload_file(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<File>>)> {
    find_project(&state.pool, project_id).await?;

    let mut upload = None;
    let mut explicit_type = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                upload = Some((filename, data));
            }
            Some("file_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                explicit_type = normalize_file_type(&text)?;
            }
            _ => {}
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))?;
    let file_type = explicit_type.or_else(|| file_type_from_name(&filename));

    let file_id = new_id();
    let storage_key = file_object_key(project_id, file_id, &filename);
    let size_bytes = data.len() as i64;
    state.storage.put(&storage_key, data).await?;

    let input = CreateFile {
        id: file_id,
        project_id,
        storage_key: storage_key.clone(),
        filename: sanitize_filename(&filename),
        file_type,
        size_bytes,
        uploaded_by: Some(user.user_id),
    };
    let file = match FileRepo::create(&state.pool, &input).await {
        Ok(file) => file,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&storage_key).await {
                tracing::warn!(key = %storage_key, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        file_id = %file.id,
        %project_id,
        size_bytes,
        user_id = %user.user_id,
        "File uploaded",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: file })))
}

/// GET /api/v1/projects/{project_id}/files
pub async fn list_files(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<File>>>> {
    find_project(&state.pool, project_id).await?;
    let files = FileRepo::list_by_project(&state.pool, project_id).await?;
    Ok(Json(DataResponse { data: files }))
}

/// GET /api/v1/files/{id}
pub async fn get_file(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<File>>> {
    let file = find_file(&state.pool, id).await?;
    Ok(Json(DataResponse { data: file }))
}

/// GET /api/v1/files/{id}/content
///
/// Streams the stored object back as an attachment.
pub async fn download_file(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let file = find_file(&state.pool, id).await?;
    let data = state.storage.get(&file.storage_key).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (CONTENT_TYPE, DOWNLOAD_CONTENT_TYPE.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

/// DELETE /api/v1/files/{id}
///
/// Removes the row (and its embeddings), then the stored object.
pub async fn delete_file(
    RequireWriter(user): RequireWriter,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let file = find_file(&state.pool, id).await?;
    if !FileRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "File", id }));
    }
    if let Err(e) = state.storage.delete(&file.storage_key).await {
        tracing::warn!(file_id = %id, key = %file.storage_key, error = %e, "Failed to delete stored object");
    }
    tracing::info!(file_id = %id, user_id = %user.user_id, "File deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/files/{id}/embeddings
///
/// Chunk listing without vectors, in sequence order.
pub async fn list_embeddings(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<EmbeddingSummary>>>> {
    find_file(&state.pool, id).await?;
    let chunks = EmbeddingRepo::list_by_file(&state.pool, id).await?;
    Ok(Json(DataResponse { data: chunks }))
}
