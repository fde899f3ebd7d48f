use std::net::SocketAddr;
use std::sync::Arc;

use biopilot_api::config::ServerConfig;
use biopilot_api::router::build_app_router;
use biopilot_api::state::AppState;
use biopilot_pipeline::workloads::builtin_registry;
use biopilot_pipeline::{StorageBackend, StorageConfig};
use biopilot_queue::{PgQueueConfig, PgTaskQueue, TaskQueue};
use biopilot_worker::Dispatcher;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "biopilot_api=debug,biopilot_worker=info,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = biopilot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    biopilot_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    biopilot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Object storage ---
    let storage_config = StorageConfig::from_env().expect("Invalid storage configuration");
    let storage =
        StorageBackend::from_config(&storage_config).expect("Failed to initialise object storage");
    tracing::info!(backend = storage.kind(), "Object storage ready");

    // --- Dispatcher ---
    // The API only needs the job type names; workloads run in the workers.
    let queue: Arc<dyn TaskQueue> =
        Arc::new(PgTaskQueue::new(pool.clone(), PgQueueConfig::default()));
    let registry = builtin_registry(&config.nextflow_bin).expect("Invalid workload registry");
    let dispatcher = Dispatcher::for_registry(pool.clone(), Arc::clone(&queue), &registry);
    tracing::info!(job_types = ?registry.job_types(), "Dispatcher ready");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        dispatcher,
        queue,
        storage,
    };

    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
