//! Integration tests for embedding chunk storage.

use assert_matches::assert_matches;
use biopilot_core::chunking::EMBEDDING_DIMENSION;
use biopilot_core::error::CoreError;
use biopilot_core::roles::UserRole;
use biopilot_core::types::{new_id, DbId};
use biopilot_db::models::embedding::NewChunk;
use biopilot_db::models::file::CreateFile;
use biopilot_db::models::org::CreateOrg;
use biopilot_db::models::project::CreateProject;
use biopilot_db::models::user::CreateUser;
use biopilot_db::repositories::{EmbeddingRepo, FileRepo, OrgRepo, ProjectRepo, UserRepo};
use biopilot_db::StoreError;
use sqlx::PgPool;

async fn seed_file(pool: &PgPool) -> DbId {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: "curator@lab.test".into(),
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
    let project = ProjectRepo::create(
        pool,
        &CreateProject {
            org_id: org.id,
            name: "Papers".into(),
            description: None,
        },
    )
    .await
    .unwrap();
    let id = new_id();
    FileRepo::create(
        pool,
        &CreateFile {
            id,
            project_id: project.id,
            storage_key: format!("projects/{}/files/{id}/paper.txt", project.id),
            filename: "paper.txt".into(),
            file_type: Some("text/plain".into()),
            size_bytes: 42,
            uploaded_by: Some(user.id),
        },
    )
    .await
    .unwrap()
    .id
}

fn chunk(tag: &str) -> NewChunk {
    NewChunk {
        vector: vec![0.5; EMBEDDING_DIMENSION],
        text_snippet: tag.to_string(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_append_numbers_chunks_in_order(pool: PgPool) {
    let file_id = seed_file(&pool).await;

    let first = EmbeddingRepo::append_chunks(&pool, file_id, &[chunk("a"), chunk("b")])
        .await
        .unwrap();
    assert_eq!(first.iter().map(|e| e.chunk_seq).collect::<Vec<_>>(), [0, 1]);

    let second = EmbeddingRepo::append_chunks(&pool, file_id, &[chunk("c")])
        .await
        .unwrap();
    assert_eq!(second[0].chunk_seq, 2);
    assert_eq!(second[0].vector.len(), EMBEDDING_DIMENSION);

    let listed = EmbeddingRepo::list_by_file(&pool, file_id).await.unwrap();
    let snippets: Vec<&str> = listed.iter().map(|e| e.text_snippet.as_str()).collect();
    assert_eq!(snippets, ["a", "b", "c"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_appends_get_unique_sequences(pool: PgPool) {
    let file_id = seed_file(&pool).await;

    let batch_a = [chunk("a0"), chunk("a1"), chunk("a2")];
    let batch_b = [chunk("b0"), chunk("b1"), chunk("b2")];
    let (a, b) = tokio::join!(
        EmbeddingRepo::append_chunks(&pool, file_id, &batch_a),
        EmbeddingRepo::append_chunks(&pool, file_id, &batch_b),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let mut seqs: Vec<i32> = a.iter().chain(b.iter()).map(|e| e.chunk_seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, [0, 1, 2, 3, 4, 5]);

    // Each writer's chunks are contiguous and in submission order.
    for batch in [&a, &b] {
        let s: Vec<i32> = batch.iter().map(|e| e.chunk_seq).collect();
        assert_eq!(s, [s[0], s[0] + 1, s[0] + 2]);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_wrong_dimension_is_rejected_before_writing(pool: PgPool) {
    let file_id = seed_file(&pool).await;
    let bad = NewChunk {
        vector: vec![1.0; 3],
        text_snippet: "short".into(),
    };

    let err = EmbeddingRepo::append_chunks(&pool, file_id, &[chunk("ok"), bad])
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Core(CoreError::Validation(_)));
    assert_eq!(EmbeddingRepo::count_for_file(&pool, file_id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_insert_at_duplicate_conflicts(pool: PgPool) {
    let file_id = seed_file(&pool).await;

    EmbeddingRepo::insert_at(&pool, file_id, 7, &chunk("seven"))
        .await
        .unwrap();
    let err = EmbeddingRepo::insert_at(&pool, file_id, 7, &chunk("again"))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Core(CoreError::Conflict(_)));

    // Appending continues after the highest explicit sequence.
    let next = EmbeddingRepo::append_chunks(&pool, file_id, &[chunk("eight")])
        .await
        .unwrap();
    assert_eq!(next[0].chunk_seq, 8);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_missing_file_is_not_found(pool: PgPool) {
    let err = EmbeddingRepo::append_chunks(&pool, new_id(), &[chunk("x")])
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Core(CoreError::NotFound { entity: "File", .. }));

    let err = EmbeddingRepo::insert_at(&pool, new_id(), 0, &chunk("x"))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Core(CoreError::NotFound { entity: "File", .. }));
}
