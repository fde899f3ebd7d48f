//! Route definitions for `/jobs`. All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// GET    /{id}            -> get_job
/// GET    /{id}/logs       -> get_job_logs
/// POST   /{id}/cancel     -> cancel_job
/// POST   /{id}/retry      -> retry_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/logs", get(jobs::get_job_logs))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/retry", post(jobs::retry_job))
}
