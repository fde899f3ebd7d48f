//! Object store configuration loaded from environment variables.
//!
//! | Env var               | Default           |
//! |-----------------------|-------------------|
//! | `STORAGE_BACKEND`     | `local`           |
//! | `STORAGE_LOCAL_DIR`   | `./data/objects`  |
//! | `MINIO_ENDPOINT`      | (unset: AWS S3)   |
//! | `MINIO_ROOT_USER`     | (required for s3) |
//! | `MINIO_ROOT_PASSWORD` | (required for s3) |
//! | `S3_BUCKET_NAME`      | `biopilot`        |
//! | `S3_REGION`           | `us-east-1`       |

use std::path::PathBuf;

use super::error::StorageError;

const DEFAULT_LOCAL_DIR: &str = "./data/objects";
const DEFAULT_BUCKET: &str = "biopilot";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    /// Objects stored as files under `root`.
    Local { root: PathBuf },
    /// S3 or an S3-compatible service such as MinIO.
    S3 {
        endpoint: Option<String>,
        bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
    },
    /// Process-local, non-persistent.
    Memory,
}

impl StorageConfig {
    /// Load from environment variables (see module docs for defaults).
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        Self::from_lookup(&backend, |key| std::env::var(key).ok())
    }

    fn from_lookup(
        backend: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StorageError> {
        match backend.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageConfig::Local {
                root: lookup("STORAGE_LOCAL_DIR")
                    .unwrap_or_else(|| DEFAULT_LOCAL_DIR.into())
                    .into(),
            }),
            "s3" | "minio" => {
                let required = |key: &str| {
                    lookup(key)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| StorageError::NotConfigured(format!("{key} not set")))
                };
                Ok(StorageConfig::S3 {
                    endpoint: lookup("MINIO_ENDPOINT").filter(|v| !v.is_empty()),
                    bucket: lookup("S3_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.into()),
                    region: lookup("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.into()),
                    access_key_id: required("MINIO_ROOT_USER")?,
                    secret_access_key: required("MINIO_ROOT_PASSWORD")?,
                })
            }
            "memory" => Ok(StorageConfig::Memory),
            other => Err(StorageError::NotConfigured(format!(
                "unknown STORAGE_BACKEND '{other}' (expected local, s3 or memory)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn local_is_default_dir() {
        let cfg = StorageConfig::from_lookup("local", lookup(&[])).unwrap();
        assert_eq!(
            cfg,
            StorageConfig::Local {
                root: PathBuf::from(DEFAULT_LOCAL_DIR)
            }
        );
    }

    #[test]
    fn minio_settings() {
        let cfg = StorageConfig::from_lookup(
            "s3",
            lookup(&[
                ("MINIO_ENDPOINT", "http://minio:9000"),
                ("MINIO_ROOT_USER", "admin"),
                ("MINIO_ROOT_PASSWORD", "secret"),
                ("S3_BUCKET_NAME", "lab-data"),
            ]),
        )
        .unwrap();
        match cfg {
            StorageConfig::S3 {
                endpoint, bucket, ..
            } => {
                assert_eq!(endpoint.as_deref(), Some("http://minio:9000"));
                assert_eq!(bucket, "lab-data");
            }
            other => panic!("expected S3 config, got {other:?}"),
        }
    }

    #[test]
    fn s3_requires_credentials() {
        let err = StorageConfig::from_lookup("s3", lookup(&[])).unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured(_)));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(StorageConfig::from_lookup("ftp", lookup(&[])).is_err());
    }
}
