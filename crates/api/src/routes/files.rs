use axum::routing::get;
use axum::Router;

use crate::handlers::files;
use crate::state::AppState;

/// Routes mounted at `/files`.
///
/// ```text
/// GET    /{id}              -> get_file
/// DELETE /{id}              -> delete_file
/// GET    /{id}/content      -> download_file
/// GET    /{id}/embeddings   -> list_embeddings
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(files::get_file).delete(files::delete_file))
        .route("/{id}/content", get(files::download_file))
        .route("/{id}/embeddings", get(files::list_embeddings))
}
