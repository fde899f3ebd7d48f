pub mod auth;
pub mod files;
pub mod health;
pub mod jobs;
pub mod orgs;
pub mod projects;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /health                                  service + database health
///
/// /auth/register                           register (public)
/// /auth/login                              login (public)
///
/// /users                                   create (admin)
/// /users/{id}                              get, delete (admin)
///
/// /orgs                                    list, create
/// /orgs/{id}                               get, delete
/// /orgs/{id}/projects                      list, create
///
/// /projects/{id}                           get, update, delete (cascade)
/// /projects/{id}/files                     list, upload (multipart)
/// /projects/{id}/jobs                      list, submit
///
/// /files/{id}                              get, delete
/// /files/{id}/content                      download
/// /files/{id}/embeddings                   chunk listing
///
/// /jobs                                    list (filters)
/// /jobs/{id}                               status, timestamps, log, result key
/// /jobs/{id}/logs                          log entries
/// /jobs/{id}/cancel                        request cancellation
/// /jobs/{id}/retry                         new attempt of a FAILED job
/// ```
///
/// Everything except `/health` and `/auth/*` requires a Bearer token;
/// mutations are refused for viewers.
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/orgs", orgs::router())
        .nest("/projects", projects::router(max_upload_bytes))
        .nest("/files", files::router())
        .nest("/jobs", jobs::router())
}
