use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("invalid object key: {0}")]
    InvalidKey(#[from] object_store::path::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ObjectStore(object_store::Error::NotFound { .. }))
    }
}
