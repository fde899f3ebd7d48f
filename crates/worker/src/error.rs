use biopilot_core::error::CoreError;
use biopilot_db::StoreError;
use biopilot_queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<CoreError> for WorkerError {
    fn from(err: CoreError) -> Self {
        WorkerError::Store(StoreError::Core(err))
    }
}

impl From<sqlx::Error> for WorkerError {
    fn from(err: sqlx::Error) -> Self {
        WorkerError::Store(StoreError::Database(err))
    }
}
