//! Workloads the worker pool can execute, plus the services they use.
//!
//! A workload is looked up by job type in a [`WorkloadRegistry`] that is
//! built once at startup and handed to the worker pool. Each run gets a
//! [`WorkloadContext`] carrying the job's parameters, a cancellation token,
//! a log sink into the job store and the shared services (database pool,
//! object store, embedder).

pub mod context;
pub mod embedder;
pub mod error;
pub mod registry;
pub mod storage;
pub mod workload;
pub mod workloads;

pub use context::{JobLog, WorkloadContext, WorkloadServices};
pub use embedder::{Embedder, EmbeddingError, HashingEmbedder};
pub use error::WorkloadError;
pub use registry::{RegisteredWorkload, WorkloadRegistry};
pub use storage::{StorageBackend, StorageConfig, StorageError};
pub use workload::Workload;
