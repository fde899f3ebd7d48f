use std::sync::Arc;
use std::time::Duration;

use biopilot_core::backoff::BackoffConfig;
use biopilot_pipeline::workloads::builtin_registry;
use biopilot_pipeline::{HashingEmbedder, StorageBackend, StorageConfig, WorkloadServices};
use biopilot_queue::{PgQueueConfig, PgTaskQueue, TaskQueue};
use biopilot_worker::{Dispatcher, ExecutorSettings, Reconciler, TaskExecutor, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "biopilot_worker=debug,biopilot_pipeline=info,biopilot_queue=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_name = %config.worker_name,
        concurrency = config.concurrency,
        soft_limit_secs = config.limits.soft.as_secs(),
        hard_limit_secs = config.limits.hard.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = biopilot_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    biopilot_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    biopilot_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Object storage ---
    let storage_config = StorageConfig::from_env().expect("Invalid storage configuration");
    let storage = StorageBackend::from_config(&storage_config).expect("Failed to initialise object storage");
    tracing::info!(backend = storage.kind(), "Object storage ready");

    // --- Queue, registry, dispatcher ---
    let queue: Arc<dyn TaskQueue> = Arc::new(PgTaskQueue::new(
        pool.clone(),
        PgQueueConfig {
            lease: config.lease,
            poll_interval: config.poll_interval,
        },
    ));
    let registry = Arc::new(builtin_registry(&config.nextflow_bin).expect("Invalid workload registry"));
    tracing::info!(job_types = ?registry.job_types(), "Workloads registered");

    let dispatcher = Dispatcher::for_registry(pool.clone(), Arc::clone(&queue), &registry);

    let services = WorkloadServices {
        pool: pool.clone(),
        storage,
        embedder: Arc::new(HashingEmbedder::default()),
    };
    let settings = ExecutorSettings {
        limits: config.limits,
        cancel_poll_interval: config.cancel_poll_interval,
        heartbeat_interval: (config.lease / 3).max(Duration::from_secs(1)),
        backoff: BackoffConfig::default(),
    };
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&queue),
        registry,
        services,
        dispatcher.clone(),
        settings,
    ));

    // --- Background loops ---
    let cancel = CancellationToken::new();

    let reconciler = Reconciler::new(dispatcher, config.reconcile_interval, config.reconcile_stale_after);
    let reconciler_cancel = cancel.clone();
    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(reconciler_cancel).await;
    });

    let worker_pool = WorkerPool::new(executor, queue, config.worker_name.clone(), config.concurrency);
    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move {
        worker_pool.run(pool_cancel).await;
    });

    shutdown_signal().await;
    cancel.cancel();

    // In-flight tasks run until they finish or hit their hard limit.
    let drain = config.limits.hard + Duration::from_secs(5);
    if tokio::time::timeout(drain, pool_handle).await.is_err() {
        tracing::warn!("Worker pool did not drain in time; remaining tasks will be redelivered");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), reconciler_handle).await;

    tracing::info!("Worker shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
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
        () = ctrl_c => tracing::info!("Received SIGINT, stopping worker"),
        () = terminate => tracing::info!("Received SIGTERM, stopping worker"),
    }
}
