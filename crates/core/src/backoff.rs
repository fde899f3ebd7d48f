//! Bounded exponential backoff for infrastructure calls.
//!
//! Store and broker operations that fail because the connection dropped are
//! retried here a bounded number of times. Workload errors never come
//! through this path.

use std::future::Future;
use std::time::Duration;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation: &str,
    config: &BackoffConfig,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_attempts && is_transient(&e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying",
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, config);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
