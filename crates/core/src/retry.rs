//! Retry policy for failed jobs.
//!
//! A FAILED job is never moved back to PENDING. Retrying means creating a
//! new job that points at the failed one through `retry_of_job_id` and
//! carries the next attempt number. Whether the worker does that on its own
//! is decided per job type by a [`RetryPolicy`]; the default never retries.

use std::time::Duration;

/// Why a job ended up FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The workload returned an error or panicked.
    Workload,
    /// The workload stopped after the soft time limit fired.
    SoftTimeout,
    /// Execution was aborted at the hard time limit.
    HardTimeout,
    /// A previous worker died while holding the job.
    StaleClaim,
    /// Somebody asked for the job to stop.
    Cancelled,
}

impl FailureKind {
    /// Cancelled jobs and jobs aborted at the hard limit are never
    /// retried automatically.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Cancelled | FailureKind::HardTimeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Exponential backoff starting at `initial_delay`, capped at ten minutes.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_secs(600),
            multiplier: 2.0,
        }
    }

    /// Whether a job that failed on `attempt` (1-based) should be retried.
    pub fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before starting `next_attempt` (2 for the first retry).
    pub fn delay_before(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.max(0.0)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
