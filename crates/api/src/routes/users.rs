use axum::routing::{get, post};
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// POST   /                -> create_user (admin)
/// GET    /{id}            -> get_user
/// DELETE /{id}            -> delete_user (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(users::create_user))
        .route("/{id}", get(users::get_user).delete(users::delete_user))
}
