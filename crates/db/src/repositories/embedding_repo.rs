//! Repository for the `embeddings` table.
//!
//! Chunk sequence numbers are allocated per file while holding a row lock
//! on the parent file, so concurrent writers for the same file never hand
//! out the same number and each writer's chunks stay contiguous.

use biopilot_core::chunking::validate_vector;
use biopilot_core::error::CoreError;
use biopilot_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::error::{is_unique_violation, StoreError};
use crate::models::embedding::{Embedding, EmbeddingSummary, NewChunk};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, file_id, chunk_seq, vector, text_snippet, created_at";

/// Column list for listings that omit the vector payload.
const SUMMARY_COLUMNS: &str = "id, file_id, chunk_seq, text_snippet, created_at";

pub struct EmbeddingRepo;

impl EmbeddingRepo {
    /// Store `chunks` for a file, numbering them after the file's current
    /// highest `chunk_seq` in slice order.
    ///
    /// All chunks are validated before anything is written. Fails with
    /// `NotFound` if the file does not exist.
    pub async fn append_chunks(
        pool: &PgPool,
        file_id: DbId,
        chunks: &[NewChunk],
    ) -> Result<Vec<Embedding>, StoreError> {
        for chunk in chunks {
            validate_vector(&chunk.vector)?;
        }

        let mut tx = pool.begin().await?;

        let locked: Option<DbId> = sqlx::query_scalar("SELECT id FROM files WHERE id = $1 FOR UPDATE")
            .bind(file_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::Core(CoreError::NotFound {
                entity: "File",
                id: file_id,
            }));
        }

        let mut next_seq: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_seq) + 1, 0) FROM embeddings WHERE file_id = $1",
        )
        .bind(file_id)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO embeddings (id, file_id, chunk_seq, vector, text_snippet) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let row = sqlx::query_as::<_, Embedding>(&query)
                .bind(new_id())
                .bind(file_id)
                .bind(next_seq)
                .bind(&chunk.vector)
                .bind(&chunk.text_snippet)
                .fetch_one(&mut *tx)
                .await?;
            stored.push(row);
            next_seq += 1;
        }

        tx.commit().await?;

        tracing::debug!(%file_id, count = stored.len(), "Stored embedding chunks");
        Ok(stored)
    }

    /// Store one chunk at an explicit sequence number.
    ///
    /// Fails with `Conflict` if the `(file_id, chunk_seq)` pair is taken and
    /// `NotFound` if the file does not exist.
    pub async fn insert_at(
        pool: &PgPool,
        file_id: DbId,
        chunk_seq: i32,
        chunk: &NewChunk,
    ) -> Result<Embedding, StoreError> {
        validate_vector(&chunk.vector)?;
        if chunk_seq < 0 {
            return Err(StoreError::Core(CoreError::Validation(
                "Chunk sequence must not be negative".into(),
            )));
        }

        let query = format!(
            "INSERT INTO embeddings (id, file_id, chunk_seq, vector, text_snippet) \
             SELECT $1, f.id, $3, $4, $5 FROM files f WHERE f.id = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, Embedding>(&query)
            .bind(new_id())
            .bind(file_id)
            .bind(chunk_seq)
            .bind(&chunk.vector)
            .bind(&chunk.text_snippet)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Core(CoreError::Conflict(format!(
                        "Chunk {chunk_seq} already exists for file {file_id}"
                    )))
                } else {
                    StoreError::Database(e)
                }
            })?;

        row.ok_or(StoreError::Core(CoreError::NotFound {
            entity: "File",
            id: file_id,
        }))
    }

    /// List a file's chunks without vectors, in sequence order.
    pub async fn list_by_file(
        pool: &PgPool,
        file_id: DbId,
    ) -> Result<Vec<EmbeddingSummary>, sqlx::Error> {
        let query = format!(
            "SELECT {SUMMARY_COLUMNS} FROM embeddings WHERE file_id = $1 ORDER BY chunk_seq ASC"
        );
        sqlx::query_as::<_, EmbeddingSummary>(&query)
            .bind(file_id)
            .fetch_all(pool)
            .await
    }

    /// Load a file's chunks including vectors, in sequence order.
    pub async fn find_by_file(pool: &PgPool, file_id: DbId) -> Result<Vec<Embedding>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM embeddings WHERE file_id = $1 ORDER BY chunk_seq ASC");
        sqlx::query_as::<_, Embedding>(&query)
            .bind(file_id)
            .fetch_all(pool)
            .await
    }

    /// Number of chunks stored for a file.
    pub async fn count_for_file(pool: &PgPool, file_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE file_id = $1")
            .bind(file_id)
            .fetch_one(pool)
            .await
    }
}
