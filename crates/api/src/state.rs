use std::sync::Arc;

use biopilot_pipeline::StorageBackend;
use biopilot_queue::TaskQueue;
use biopilot_worker::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: biopilot_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Creates jobs and hands them to the task queue.
    pub dispatcher: Dispatcher,
    /// Same queue the dispatcher writes to; read for health reporting.
    pub queue: Arc<dyn TaskQueue>,
    /// Uploaded files and job artifacts.
    pub storage: StorageBackend,
}
