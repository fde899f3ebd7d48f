//! `embed_file`: chunk an uploaded text file and store one embedding per chunk.
//!
//! Parameters: `file_id` (required), `chunk_chars` and `overlap` (defaults
//! from `biopilot_core::chunking`). The file must belong to the job's
//! project. Produces no artifact.

use async_trait::async_trait;
use biopilot_core::chunking::{chunk_text, DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP};
use biopilot_core::types::DbId;
use biopilot_db::models::embedding::NewChunk;
use biopilot_db::repositories::{EmbeddingRepo, FileRepo};
use serde::Deserialize;

use crate::context::WorkloadContext;
use crate::embedder::EmbeddingError;
use crate::error::WorkloadError;
use crate::workload::Workload;

/// Chunks embedded and stored per round trip.
const BATCH_SIZE: usize = 32;

/// Maximum length of the stored text snippet.
const SNIPPET_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct EmbedParams {
    file_id: DbId,
    #[serde(default = "default_chunk_chars")]
    chunk_chars: usize,
    #[serde(default = "default_overlap")]
    overlap: usize,
}

fn default_chunk_chars() -> usize {
    DEFAULT_CHUNK_CHARS
}

fn default_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

pub struct EmbedFileWorkload;

#[async_trait]
impl Workload for EmbedFileWorkload {
    async fn run(&self, ctx: &WorkloadContext) -> Result<Option<String>, WorkloadError> {
        let params: EmbedParams = ctx.params()?;
        let services = &ctx.services;

        let file = FileRepo::find_by_id(&services.pool, params.file_id)
            .await?
            .filter(|f| f.project_id == ctx.project_id)
            .ok_or_else(|| {
                WorkloadError::InvalidParameters(format!(
                    "file {} not found in project {}",
                    params.file_id, ctx.project_id
                ))
            })?;

        let bytes = services.storage.get(&file.storage_key).await?;
        let text = String::from_utf8_lossy(&bytes);
        let chunks = chunk_text(&text, params.chunk_chars, params.overlap)
            .map_err(|e| WorkloadError::InvalidParameters(e.to_string()))?;
        ctx.log
            .info(format!("{}: {} chunks", file.filename, chunks.len()))
            .await;

        let expected = services.embedder.dimensions();
        let mut stored = 0usize;
        for batch in chunks.chunks(BATCH_SIZE) {
            ctx.check_cancelled()?;

            let texts: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = services.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(WorkloadError::Failed(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            let mut new_chunks = Vec::with_capacity(batch.len());
            for (text, vector) in batch.iter().zip(vectors) {
                if vector.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    }
                    .into());
                }
                new_chunks.push(NewChunk {
                    vector,
                    text_snippet: text.chars().take(SNIPPET_CHARS).collect(),
                });
            }

            EmbeddingRepo::append_chunks(&services.pool, file.id, &new_chunks).await?;
            stored += new_chunks.len();
        }

        ctx.log
            .info(format!("stored {stored} embeddings for file {}", file.id))
            .await;
        Ok(None)
    }
}
