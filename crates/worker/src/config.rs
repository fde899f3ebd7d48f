use std::time::Duration;

use biopilot_core::limits::{TimeLimits, DEFAULT_HARD_LIMIT_SECS, DEFAULT_SOFT_LIMIT_SECS};

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Prefix for worker identities recorded in `claimed_by`.
    pub worker_name: String,
    /// Number of concurrent worker loops.
    pub concurrency: usize,
    /// Soft and hard execution limits per task.
    pub limits: TimeLimits,
    /// Delay between queue polls while idle.
    pub poll_interval: Duration,
    /// Queue lease length; extended by heartbeat while a task runs.
    pub lease: Duration,
    /// How often a running task checks for a cancellation request.
    pub cancel_poll_interval: Duration,
    /// How often the reconciliation sweep runs.
    pub reconcile_interval: Duration,
    /// Age after which a PENDING job is re-enqueued.
    pub reconcile_stale_after: Duration,
    /// Executable used by the `nextflow` workload.
    pub nextflow_bin: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default          |
    /// |-----------------------------|------------------|
    /// | `WORKER_NAME`               | `worker-<pid>`   |
    /// | `WORKER_CONCURRENCY`        | `4`              |
    /// | `TASK_SOFT_TIME_LIMIT_SECS` | `3000`           |
    /// | `TASK_TIME_LIMIT_SECS`      | `3600`           |
    /// | `QUEUE_POLL_INTERVAL_MS`    | `500`            |
    /// | `QUEUE_LEASE_SECS`          | `60`             |
    /// | `CANCEL_POLL_INTERVAL_MS`   | `2000`           |
    /// | `RECONCILE_INTERVAL_SECS`   | `60`             |
    /// | `RECONCILE_STALE_SECS`      | `120`            |
    /// | `NEXTFLOW_BIN`              | `nextflow`       |
    ///
    /// Panics on malformed values; binaries call this once at startup.
    pub fn from_env() -> Self {
        let worker_name = std::env::var("WORKER_NAME")
            .unwrap_or_else(|_| format!("worker-{}", std::process::id()));

        let soft = env_or("TASK_SOFT_TIME_LIMIT_SECS", DEFAULT_SOFT_LIMIT_SECS);
        let hard = env_or("TASK_TIME_LIMIT_SECS", DEFAULT_HARD_LIMIT_SECS);
        let limits = TimeLimits::new(Duration::from_secs(soft), Duration::from_secs(hard))
            .expect("TASK_SOFT_TIME_LIMIT_SECS must not exceed TASK_TIME_LIMIT_SECS");

        Self {
            worker_name,
            concurrency: env_or("WORKER_CONCURRENCY", 4usize).max(1),
            limits,
            poll_interval: Duration::from_millis(env_or("QUEUE_POLL_INTERVAL_MS", 500)),
            lease: Duration::from_secs(env_or("QUEUE_LEASE_SECS", 60)),
            cancel_poll_interval: Duration::from_millis(env_or("CANCEL_POLL_INTERVAL_MS", 2000)),
            reconcile_interval: Duration::from_secs(env_or("RECONCILE_INTERVAL_SECS", 60)),
            reconcile_stale_after: Duration::from_secs(env_or("RECONCILE_STALE_SECS", 120)),
            nextflow_bin: std::env::var("NEXTFLOW_BIN").unwrap_or_else(|_| "nextflow".into()),
        }
    }
}
