use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when a dependency is unreachable.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub db_healthy: bool,
    /// Messages waiting or in flight; `None` when the queue is unreachable.
    pub queue_depth: Option<u64>,
}

/// GET /health -- returns service, database and queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = biopilot_db::health_check(&state.pool).await.is_ok();
    let queue_depth = match state.queue.depth().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "Queue depth check failed");
            None
        }
    };

    let status = if db_healthy && queue_depth.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        queue_depth,
    })
}

/// Mount health check routes (used at root level and under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
