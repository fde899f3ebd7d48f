use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;

use crate::handlers::{files, jobs, projects};
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /{id}            -> get_project
/// PATCH  /{id}            -> update_project
/// DELETE /{id}            -> delete_project
/// GET    /{id}/files      -> list_files
/// POST   /{id}/files      -> upload_file (multipart, up to `max_upload_bytes`)
/// GET    /{id}/jobs       -> list_project_jobs
/// POST   /{id}/jobs       -> submit_job
/// ```
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/{id}/files",
            get(files::list_files)
                .post(files::upload_file)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/{id}/jobs",
            get(jobs::list_project_jobs).post(jobs::submit_job),
        )
}
