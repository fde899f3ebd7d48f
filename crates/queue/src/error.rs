//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueError {
    /// Whether retrying the same call may succeed (connection-level trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
        }
    }
}
