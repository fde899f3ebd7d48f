use biopilot_db::StoreError;

use crate::embedder::EmbeddingError;
use crate::storage::StorageError;

/// Failure reported by a workload. Rendered into the job log on FAILED.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Failed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),
}
