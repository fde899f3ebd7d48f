//! HTTP-level integration tests for job submission, inspection,
//! cancellation and retry.

mod common;

use axum::http::StatusCode;
use biopilot_core::job_log::LEVEL_ERROR;
use biopilot_core::job_status::JobStatus;
use biopilot_core::roles::UserRole;
use biopilot_core::types::{new_id, DbId};
use biopilot_db::models::job::TransitionFields;
use biopilot_db::repositories::JobRepo;
use biopilot_queue::TaskQueue;
use common::{body_json, get_auth, post_auth, post_json_auth};
use sqlx::PgPool;

async fn submit(
    state: &biopilot_api::state::AppState,
    token: &str,
    project_id: DbId,
    body: serde_json::Value,
) -> axum::response::Response {
    post_json_auth(
        common::app_for(state),
        &format!("/api/v1/projects/{project_id}/jobs"),
        token,
        body,
    )
    .await
}

/// Drive a job to FAILED the way a worker would.
async fn fail_job(pool: &PgPool, job_id: DbId) {
    JobRepo::transition(pool, job_id, JobStatus::Running, &TransitionFields::claim("w-1", new_id()))
        .await
        .unwrap();
    JobRepo::append_log(pool, job_id, LEVEL_ERROR, "[workload error] boom")
        .await
        .unwrap();
    JobRepo::transition(pool, job_id, JobStatus::Failed, &TransitionFields::default())
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_submit_enqueues_and_returns_queued(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, queue) = common::test_state(pool);

    let response = submit(
        &state,
        &token,
        project_id,
        serde_json::json!({ "job_type": "demo", "parameters": { "n": 3 } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "QUEUED");
    assert_eq!(json["data"]["job_type"], "demo");
    assert_eq!(json["data"]["attempt"], 1);
    assert!(json["data"]["retry_of_job_id"].is_null());

    let job_id: DbId = json["data"]["id"].as_str().unwrap().parse().unwrap();
    assert!(queue.contains_job(job_id));
    assert_eq!(queue.depth().await.unwrap(), 1);

    let response = get_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "QUEUED");
    assert_eq!(json["data"]["parameters"]["n"], 3);
    assert!(json["data"]["queued_at"].is_string());
    assert!(json["data"]["started_at"].is_null());
    assert!(json["data"]["logs"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_job_type_is_rejected_without_a_row(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, queue) = common::test_state(pool.clone());

    let response = submit(
        &state,
        &token,
        project_id,
        serde_json::json!({ "job_type": "does_not_exist" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(queue.depth().await.unwrap(), 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_non_object_parameters_are_rejected(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, _queue) = common::test_state(pool);

    let response = submit(
        &state,
        &token,
        project_id,
        serde_json::json!({ "job_type": "demo", "parameters": [1, 2, 3] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_submit_to_missing_project_returns_404(pool: PgPool) {
    let (_, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let (state, queue) = common::test_state(pool);

    let response = submit(
        &state,
        &token,
        new_id(),
        serde_json::json!({ "job_type": "demo" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_viewer_cannot_submit(pool: PgPool) {
    let (owner, _) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let (_, viewer) = common::create_user(&pool, "view@lab.example", UserRole::Viewer).await;
    let project_id = common::create_project(&pool, owner.id).await;
    let (state, queue) = common::test_state(pool);

    let response = submit(
        &state,
        &viewer,
        project_id,
        serde_json::json!({ "job_type": "demo" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logs_are_exposed_in_order(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, _queue) = common::test_state(pool.clone());

    let response = submit(&state, &token, project_id, serde_json::json!({ "job_type": "demo" })).await;
    let json = body_json(response).await;
    let job_id: DbId = json["data"]["id"].as_str().unwrap().parse().unwrap();

    fail_job(&pool, job_id).await;

    let response = get_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}/logs"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["level"], "error");

    let response = get_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}"),
        &token,
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "FAILED");
    assert!(json["data"]["logs"]
        .as_str()
        .unwrap()
        .contains("[workload error] boom"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_cancel_flags_job_and_conflicts_once_terminal(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, _queue) = common::test_state(pool.clone());

    let response = submit(&state, &token, project_id, serde_json::json!({ "job_type": "demo" })).await;
    let json = body_json(response).await;
    let job_id: DbId = json["data"]["id"].as_str().unwrap().parse().unwrap();

    let response = post_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}/cancel"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert!(json["data"]["cancel_requested_at"].is_string());
    assert!(JobRepo::is_cancel_requested(&pool, job_id).await.unwrap());

    fail_job(&pool, job_id).await;

    let response = post_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}/cancel"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{}/cancel", new_id()),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_retry_creates_a_linked_job(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_id = common::create_project(&pool, user.id).await;
    let (state, queue) = common::test_state(pool.clone());

    let response = submit(
        &state,
        &token,
        project_id,
        serde_json::json!({ "job_type": "demo", "parameters": { "fail": true } }),
    )
    .await;
    let json = body_json(response).await;
    let job_id: DbId = json["data"]["id"].as_str().unwrap().parse().unwrap();

    // Not FAILED yet.
    let response = post_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}/retry"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    fail_job(&pool, job_id).await;

    let response = post_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs/{job_id}/retry"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "QUEUED");
    assert_eq!(json["data"]["attempt"], 2);
    assert_eq!(json["data"]["retry_of_job_id"], job_id.to_string());

    let retry_id: DbId = json["data"]["id"].as_str().unwrap().parse().unwrap();
    assert!(queue.contains_job(retry_id));

    let retry = JobRepo::find_by_id(&pool, retry_id).await.unwrap().unwrap();
    assert_eq!(retry.parameters["fail"], true);

    // The original stays FAILED.
    let original = JobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(original.status, JobStatus::Failed);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_jobs_filters_by_status_and_project(pool: PgPool) {
    let (user, token) = common::create_user(&pool, "pi@lab.example", UserRole::User).await;
    let project_a = common::create_project(&pool, user.id).await;
    let project_b = common::create_project(&pool, user.id).await;
    let (state, _queue) = common::test_state(pool.clone());

    let mut ids = Vec::new();
    for project_id in [project_a, project_a, project_b] {
        let response =
            submit(&state, &token, project_id, serde_json::json!({ "job_type": "demo" })).await;
        let json = body_json(response).await;
        ids.push(json["data"]["id"].as_str().unwrap().parse::<DbId>().unwrap());
    }
    fail_job(&pool, ids[0]).await;

    let response = get_auth(
        common::app_for(&state),
        "/api/v1/jobs?status=FAILED",
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let jobs = json["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], ids[0].to_string());

    let response = get_auth(
        common::app_for(&state),
        &format!("/api/v1/projects/{project_a}/jobs"),
        &token,
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let response = get_auth(
        common::app_for(&state),
        &format!("/api/v1/jobs?project_id={project_b}&limit=10"),
        &token,
    )
    .await;
    let json = body_json(response).await;
    let jobs = json["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], ids[2].to_string());

    let response = get_auth(
        common::app_for(&state),
        "/api/v1/jobs?status=NOT_A_STATUS",
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
