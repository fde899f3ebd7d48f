use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use biopilot_core::error::CoreError;
use biopilot_db::StoreError;
use biopilot_pipeline::StorageError;
use biopilot_queue::QueueError;
use biopilot_worker::WorkerError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce `{ "error", "code" }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(core) => AppError::Core(core),
            StoreError::Database(db) => AppError::Database(db),
        }
    }
}

impl From<WorkerError> for AppError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Store(store) => store.into(),
            WorkerError::Queue(queue) => AppError::Queue(queue),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Core(CoreError::Validation(err.to_string()))
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", core.to_string())
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::Queue(err) => {
                tracing::error!(error = %err, "Task queue error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_UNAVAILABLE",
                    "The task queue is unavailable".to_string(),
                )
            }

            AppError::Storage(err) if err.is_not_found() => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Stored object not found".to_string(),
            ),
            AppError::Storage(err) => {
                tracing::error!(error = %err, "Object storage error");
                internal()
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique violations (23505) map to 409.
/// - Foreign key violations (23503) map to 409: the row is still referenced.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => {
                let constraint = db_err.constraint().unwrap_or("unknown");
                (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                )
            }
            Some("23503") => {
                let constraint = db_err.constraint().unwrap_or("unknown");
                (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Record is still referenced ({constraint})"),
                )
            }
            _ => {
                tracing::error!(error = %db_err, "Database error");
                internal()
            }
        },
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
