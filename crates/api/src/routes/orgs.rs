use axum::routing::get;
use axum::Router;

use crate::handlers::{orgs, projects};
use crate::state::AppState;

/// Routes mounted at `/orgs`.
///
/// ```text
/// GET    /                -> list_orgs
/// POST   /                -> create_org
/// GET    /{id}            -> get_org
/// DELETE /{id}            -> delete_org
/// GET    /{id}/projects   -> list_projects
/// POST   /{id}/projects   -> create_project
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(orgs::list_orgs).post(orgs::create_org))
        .route("/{id}", get(orgs::get_org).delete(orgs::delete_org))
        .route(
            "/{id}/projects",
            get(projects::list_projects).post(projects::create_project),
        )
}
