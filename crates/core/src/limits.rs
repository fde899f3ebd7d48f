//! Per-task time budgets.

use std::time::Duration;

use crate::error::CoreError;

/// Default soft limit: 50 minutes.
pub const DEFAULT_SOFT_LIMIT_SECS: u64 = 3000;

/// Default hard limit: 60 minutes.
pub const DEFAULT_HARD_LIMIT_SECS: u64 = 3600;

/// Soft and hard execution limits for a single task.
///
/// At `soft` the workload's cancellation token fires and the job is failed
/// once the workload returns. At `hard` execution is aborted outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl TimeLimits {
    pub fn new(soft: Duration, hard: Duration) -> Result<Self, CoreError> {
        if soft.is_zero() || hard.is_zero() {
            return Err(CoreError::Validation(
                "Time limits must be greater than zero".into(),
            ));
        }
        if soft > hard {
            return Err(CoreError::Validation(format!(
                "Soft time limit ({}s) must not exceed hard time limit ({}s)",
                soft.as_secs(),
                hard.as_secs()
            )));
        }
        Ok(Self { soft, hard })
    }

    /// Time between the soft signal and the hard abort.
    pub fn grace(&self) -> Duration {
        self.hard.saturating_sub(self.soft)
    }
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(DEFAULT_SOFT_LIMIT_SECS),
            hard: Duration::from_secs(DEFAULT_HARD_LIMIT_SECS),
        }
    }
}
