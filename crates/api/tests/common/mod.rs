#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use biopilot_api::auth::jwt::{generate_access_token, JwtConfig};
use biopilot_api::auth::password::hash_password;
use biopilot_api::config::ServerConfig;
use biopilot_api::router::build_app_router;
use biopilot_api::state::AppState;
use biopilot_core::roles::UserRole;
use biopilot_core::types::DbId;
use biopilot_db::models::org::CreateOrg;
use biopilot_db::models::project::CreateProject;
use biopilot_db::models::user::{CreateUser, User};
use biopilot_db::repositories::{OrgRepo, ProjectRepo, UserRepo};
use biopilot_pipeline::workloads::builtin_registry;
use biopilot_pipeline::StorageBackend;
use biopilot_queue::{MemoryTaskQueue, TaskQueue};
use biopilot_worker::Dispatcher;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

/// Password used for every seeded account.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        nextflow_bin: "nextflow".to_string(),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// App state backed by an in-memory queue and object store.
///
/// The returned queue is the one the dispatcher writes to, so tests can
/// inspect what was enqueued.
pub fn test_state(pool: PgPool) -> (AppState, Arc<MemoryTaskQueue>) {
    let config = test_config();
    let memory_queue = Arc::new(MemoryTaskQueue::default());
    let queue: Arc<dyn TaskQueue> = memory_queue.clone();
    let registry = builtin_registry(&config.nextflow_bin).expect("builtin registry");
    let dispatcher = Dispatcher::for_registry(pool.clone(), Arc::clone(&queue), &registry);

    let state = AppState {
        pool,
        config: Arc::new(config),
        dispatcher,
        queue,
        storage: StorageBackend::in_memory(),
    };
    (state, memory_queue)
}

/// Build the full application router (same middleware as production).
pub fn build_test_app(pool: PgPool) -> Router {
    build_app_router(test_state(pool).0)
}

/// Build the router for an existing state, e.g. to share its queue/storage
/// across several requests.
pub fn app_for(state: &AppState) -> Router {
    build_app_router(state.clone())
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Insert a user with the given role and mint an access token for it.
pub async fn create_user(pool: &PgPool, email: &str, role: UserRole) -> (User, String) {
    let password_hash = hash_password(TEST_PASSWORD).expect("hashing should succeed");
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            password_hash,
            name: None,
            role,
        },
    )
    .await
    .expect("user creation should succeed");

    let token =
        generate_access_token(user.id, role, &test_config().jwt).expect("token generation");
    (user, token)
}

/// Insert an org owned by `owner` with one project; returns the project id.
pub async fn create_project(pool: &PgPool, owner: DbId) -> DbId {
    let org = OrgRepo::create(
        pool,
        &CreateOrg {
            name: "Genomics Lab".to_string(),
            owner_user_id: owner,
        },
    )
    .await
    .expect("org creation should succeed");

    ProjectRepo::create(
        pool,
        &CreateProject {
            org_id: org.id,
            name: "Exome batch 7".to_string(),
            description: None,
        },
    )
    .await
    .expect("project creation should succeed")
    .id
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("request should complete")
}

fn builder(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, builder(Method::GET, uri, None).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(
        app,
        builder(Method::GET, uri, Some(token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    builder(method, uri, token)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, json_request(Method::POST, uri, None, body)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, json_request(Method::POST, uri, Some(token), body)).await
}

pub async fn patch_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, json_request(Method::PATCH, uri, Some(token), body)).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(
        app,
        builder(Method::POST, uri, Some(token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(
        app,
        builder(Method::DELETE, uri, Some(token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

/// POST a multipart form with a `file` field under the given filename.
pub async fn upload_auth(
    app: Router,
    uri: &str,
    token: &str,
    filename: &str,
    content_type: &str,
    content: &[u8],
) -> Response<Body> {
    upload_typed_auth(app, uri, token, None, filename, content_type, content).await
}

/// Like [`upload_auth`], with an optional `file_type` text field sent first.
pub async fn upload_typed_auth(
    app: Router,
    uri: &str,
    token: &str,
    file_type: Option<&str>,
    filename: &str,
    content_type: &str,
    content: &[u8],
) -> Response<Body> {
    const BOUNDARY: &str = "biopilot-test-boundary";

    let mut body = Vec::new();
    if let Some(file_type) = file_type {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"file_type\"\r\n\r\n\
                 {file_type}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = builder(Method::POST, uri, Some(token))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// Collect a response body into bytes.
pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
}

/// Parse a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body should be valid JSON")
}
