//! Object store for uploaded files and job artifacts.
//!
//! Wraps `object_store` so the rest of the system deals in plain string
//! keys. The database only ever stores keys; bytes live here.

mod config;
mod error;

use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

pub use config::StorageConfig;
pub use error::StorageError;

/// Cheaply cloneable handle to the configured object store.
#[derive(Clone)]
pub struct StorageBackend {
    store: Arc<dyn ObjectStore>,
    kind: &'static str,
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackend")
            .field("kind", &self.kind)
            .finish()
    }
}

impl StorageBackend {
    /// Build the backend described by `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        match config {
            StorageConfig::Local { root } => {
                std::fs::create_dir_all(root)?;
                let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
                let store = LocalFileSystem::new_with_prefix(&canonical)?;
                tracing::info!(root = %canonical.display(), "Storage: local backend");
                Ok(Self {
                    store: Arc::new(store),
                    kind: "local",
                })
            }
            StorageConfig::S3 {
                endpoint,
                bucket,
                region,
                access_key_id,
                secret_access_key,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_region(region)
                    .with_bucket_name(bucket)
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key);

                if let Some(endpoint) = endpoint {
                    // object_store requires an absolute URL.
                    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://")
                    {
                        endpoint.clone()
                    } else {
                        format!("http://{endpoint}")
                    };
                    builder = builder
                        .with_allow_http(url.starts_with("http://"))
                        .with_endpoint(&url)
                        .with_virtual_hosted_style_request(false);
                }

                let store = builder.build()?;
                tracing::info!(%bucket, endpoint = ?endpoint, "Storage: S3 backend");
                Ok(Self {
                    store: Arc::new(store),
                    kind: "s3",
                })
            }
            StorageConfig::Memory => Ok(Self::in_memory()),
        }
    }

    /// A fresh, empty, process-local store.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            kind: "memory",
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Write an object, replacing any existing one under `key`.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = Path::parse(key)?;
        let size = data.len();
        self.store.put(&path, PutPayload::from(data)).await?;
        tracing::debug!(key, size, "Stored object");
        Ok(())
    }

    /// Read a whole object into memory.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = Path::parse(key)?;
        let bytes = self.store.get(&path).await?.bytes().await?;
        Ok(bytes)
    }

    /// Delete an object. Deleting a missing object succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = Path::parse(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether an object exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = Path::parse(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
