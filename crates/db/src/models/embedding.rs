//! Embedding entity model and DTOs.
//!
//! Vectors are stored as `REAL[]` with a fixed dimension checked both here
//! and by the table constraint.

use biopilot_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `embeddings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Embedding {
    pub id: DbId,
    pub file_id: DbId,
    pub chunk_seq: i32,
    pub vector: Vec<f32>,
    pub text_snippet: String,
    pub created_at: Timestamp,
}

/// Listing shape without the vector payload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmbeddingSummary {
    pub id: DbId,
    pub file_id: DbId,
    pub chunk_seq: i32,
    pub text_snippet: String,
    pub created_at: Timestamp,
}

/// One chunk to store. The sequence number is assigned by the repository
/// unless inserted through [`crate::repositories::EmbeddingRepo::insert_at`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewChunk {
    pub vector: Vec<f32>,
    pub text_snippet: String,
}
