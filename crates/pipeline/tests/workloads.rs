//! Integration tests for the built-in workloads against a real job store.

use std::sync::Arc;

use assert_matches::assert_matches;
use biopilot_core::chunking::EMBEDDING_DIMENSION;
use biopilot_core::roles::UserRole;
use biopilot_core::types::{new_id, DbId};
use biopilot_db::models::file::CreateFile;
use biopilot_db::models::job::{Job, NewJob};
use biopilot_db::models::org::CreateOrg;
use biopilot_db::models::project::CreateProject;
use biopilot_db::models::user::CreateUser;
use biopilot_db::repositories::{EmbeddingRepo, FileRepo, JobRepo, OrgRepo, ProjectRepo, UserRepo};
use biopilot_pipeline::workloads::{
    DemoWorkload, EmbedFileWorkload, NextflowWorkload, SampleTaskWorkload,
};
use biopilot_pipeline::{
    HashingEmbedder, StorageBackend, Workload, WorkloadContext, WorkloadError, WorkloadServices,
};
use bytes::Bytes;
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_project(pool: &PgPool) -> DbId {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: format!("{}@lab.test", new_id()),
            password_hash: "x".into(),
            name: None,
            role: UserRole::User,
        },
    )
    .await
    .unwrap();
    let org = OrgRepo::create(
        pool,
        &CreateOrg {
            name: "Lab".into(),
            owner_user_id: user.id,
        },
    )
    .await
    .unwrap();
    ProjectRepo::create(
        pool,
        &CreateProject {
            org_id: org.id,
            name: "Pipelines".into(),
            description: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn new_job(pool: &PgPool, project_id: DbId, job_type: &str, params: serde_json::Value) -> Job {
    JobRepo::create(pool, &NewJob::new(project_id, job_type, params))
        .await
        .unwrap()
}

fn services(pool: &PgPool) -> WorkloadServices {
    WorkloadServices {
        pool: pool.clone(),
        storage: StorageBackend::in_memory(),
        embedder: Arc::new(HashingEmbedder::default()),
    }
}

async fn log_text(pool: &PgPool, job_id: DbId) -> String {
    JobRepo::get(pool, job_id).await.unwrap().logs.unwrap_or_default()
}

// ---------------------------------------------------------------------------
// demo
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_demo_writes_artifact(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(&pool, project_id, "demo", json!({"n": 1})).await;
    let services = services(&pool);
    let ctx = WorkloadContext::new(&job, services.clone(), CancellationToken::new());

    let key = DemoWorkload.run(&ctx).await.unwrap();
    assert_eq!(key.as_deref(), Some("out/demo-1.tar"));
    assert!(services.storage.exists("out/demo-1.tar").await.unwrap());
    assert!(log_text(&pool, job.id).await.contains("demo run n=1"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_demo_failure_and_bad_params(pool: PgPool) {
    let project_id = seed_project(&pool).await;

    let job = new_job(&pool, project_id, "demo", json!({"fail": "reference genome missing"})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());
    let err = DemoWorkload.run(&ctx).await.unwrap_err();
    assert_matches!(err, WorkloadError::Failed(ref m) if m == "reference genome missing");

    let job = new_job(&pool, project_id, "demo", json!({"n": "one"})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());
    assert_matches!(
        DemoWorkload.run(&ctx).await,
        Err(WorkloadError::InvalidParameters(_))
    );
}

// ---------------------------------------------------------------------------
// sample_task
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_sample_task_logs_each_step(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(
        &pool,
        project_id,
        "sample_task",
        json!({"word": "hello", "step_ms": 1}),
    )
    .await;
    let services = services(&pool);
    let ctx = WorkloadContext::new(&job, services.clone(), CancellationToken::new());

    let key = SampleTaskWorkload.run(&ctx).await.unwrap().unwrap();
    assert_eq!(key, format!("results/{}/sample_task.txt", job.id));
    assert_eq!(
        services.storage.get(&key).await.unwrap(),
        Bytes::from("Sample task complete: hello")
    );

    let logs = log_text(&pool, job.id).await;
    assert!(logs.contains("processing hello 1/10"));
    assert!(logs.contains("processing hello 10/10"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_sample_task_stops_on_cancel(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(
        &pool,
        project_id,
        "sample_task",
        json!({"word": "slow", "step_ms": 60000}),
    )
    .await;
    let cancel = CancellationToken::new();
    let ctx = WorkloadContext::new(&job, services(&pool), cancel.clone());

    let run = tokio::spawn(async move { SampleTaskWorkload.run(&ctx).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(WorkloadError::Cancelled));
}

// ---------------------------------------------------------------------------
// embed_file
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_embed_file_stores_chunks(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let services = services(&pool);

    let file_id = new_id();
    let key = format!("projects/{project_id}/files/{file_id}/notes.txt");
    let text = "BRCA1 ".repeat(300);
    services
        .storage
        .put(&key, Bytes::from(text.clone()))
        .await
        .unwrap();
    FileRepo::create(
        &pool,
        &CreateFile {
            id: file_id,
            project_id,
            storage_key: key,
            filename: "notes.txt".into(),
            file_type: Some("text/plain".into()),
            size_bytes: text.len() as i64,
            uploaded_by: None,
        },
    )
    .await
    .unwrap();

    let job = new_job(
        &pool,
        project_id,
        "embed_file",
        json!({"file_id": file_id, "chunk_chars": 500, "overlap": 50}),
    )
    .await;
    let ctx = WorkloadContext::new(&job, services, CancellationToken::new());
    assert_eq!(EmbedFileWorkload.run(&ctx).await.unwrap(), None);

    let stored = EmbeddingRepo::find_by_file(&pool, file_id).await.unwrap();
    assert!(stored.len() >= 4);
    assert!(stored.iter().all(|e| e.vector.len() == EMBEDDING_DIMENSION));
    let seqs: Vec<i32> = stored.iter().map(|e| e.chunk_seq).collect();
    assert_eq!(seqs, (0..stored.len() as i32).collect::<Vec<_>>());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_embed_file_rejects_foreign_file(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(&pool, project_id, "embed_file", json!({"file_id": new_id()})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());
    assert_matches!(
        EmbedFileWorkload.run(&ctx).await,
        Err(WorkloadError::InvalidParameters(_))
    );
}

// ---------------------------------------------------------------------------
// nextflow (driven through ordinary shell tools)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nextflow_success_stores_output(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let services = services(&pool);
    let ctx = WorkloadContext::new(&job, services.clone(), CancellationToken::new());

    // `echo run hello` stands in for `nextflow run hello`.
    let workload = NextflowWorkload::new("echo");
    let key = workload.run(&ctx).await.unwrap().unwrap();
    assert_eq!(key, format!("results/{}/nextflow.log", job.id));
    assert_eq!(services.storage.get(&key).await.unwrap(), Bytes::from("run hello\n"));
    assert!(log_text(&pool, job.id).await.contains("run hello"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nextflow_nonzero_exit_fails(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());

    let err = NextflowWorkload::new("false").run(&ctx).await.unwrap_err();
    assert_matches!(err, WorkloadError::Failed(ref m) if m.starts_with("nextflow exited with 1"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nextflow_missing_binary_is_process_error(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());

    let err = NextflowWorkload::new("/nonexistent/nextflow")
        .run(&ctx)
        .await
        .unwrap_err();
    assert_matches!(err, WorkloadError::Io(_));
}

/// Fresh scratch directory for one test.
fn scratch_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("biopilot-test-{}", new_id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nextflow_removes_work_dir_after_run(pool: PgPool) {
    let project_id = seed_project(&pool).await;
    let work_root = scratch_dir();

    let ok_job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let ctx = WorkloadContext::new(&ok_job, services(&pool), CancellationToken::new());
    NextflowWorkload::new("echo")
        .with_work_root(&work_root)
        .run(&ctx)
        .await
        .unwrap();
    assert!(!work_root.join(ok_job.id.to_string()).exists());

    let failed_job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let ctx = WorkloadContext::new(&failed_job, services(&pool), CancellationToken::new());
    NextflowWorkload::new("false")
        .with_work_root(&work_root)
        .run(&ctx)
        .await
        .unwrap_err();
    assert!(!work_root.join(failed_job.id.to_string()).exists());

    assert_eq!(std::fs::read_dir(&work_root).unwrap().count(), 0);
    std::fs::remove_dir_all(&work_root).unwrap();
}

#[cfg(unix)]
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nextflow_removes_work_dir_when_run_is_dropped(pool: PgPool) {
    use std::os::unix::fs::PermissionsExt;

    let project_id = seed_project(&pool).await;
    let work_root = scratch_dir();
    let script = work_root.join("slow-nextflow.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let job = new_job(&pool, project_id, "nextflow", json!({"pipeline": "hello"})).await;
    let ctx = WorkloadContext::new(&job, services(&pool), CancellationToken::new());
    let workload = NextflowWorkload::new(script.to_string_lossy()).with_work_root(&work_root);
    let job_dir = work_root.join(job.id.to_string());

    // A hard time limit drops the run future the same way.
    let run = tokio::time::timeout(std::time::Duration::from_millis(300), workload.run(&ctx)).await;
    assert!(run.is_err(), "run should still be in progress");

    let mut gone = false;
    for _ in 0..50 {
        if !job_dir.exists() {
            gone = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(gone, "work dir {} should be removed", job_dir.display());
    std::fs::remove_dir_all(&work_root).unwrap();
}
