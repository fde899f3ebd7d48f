//! Mapping from job type names to workloads.

use std::collections::HashMap;
use std::sync::Arc;

use biopilot_core::error::CoreError;
use biopilot_core::naming::validate_job_type;
use biopilot_core::retry::RetryPolicy;

use crate::workload::Workload;

/// A workload plus the per-type execution policy.
#[derive(Clone)]
pub struct RegisteredWorkload {
    pub workload: Arc<dyn Workload>,
    pub retry: RetryPolicy,
}

/// Registry of known job types. Built at startup, then shared read-only.
#[derive(Clone, Default)]
pub struct WorkloadRegistry {
    entries: HashMap<String, RegisteredWorkload>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload that is never retried automatically.
    pub fn register(
        &mut self,
        job_type: &str,
        workload: impl Workload + 'static,
    ) -> Result<(), CoreError> {
        self.register_with_retry(job_type, workload, RetryPolicy::none())
    }

    /// Register a workload with an automatic retry policy.
    ///
    /// Fails on an invalid name or if the type is already registered.
    pub fn register_with_retry(
        &mut self,
        job_type: &str,
        workload: impl Workload + 'static,
        retry: RetryPolicy,
    ) -> Result<(), CoreError> {
        validate_job_type(job_type)?;
        if self.entries.contains_key(job_type) {
            return Err(CoreError::Conflict(format!(
                "Job type '{job_type}' is already registered"
            )));
        }
        self.entries.insert(
            job_type.to_string(),
            RegisteredWorkload {
                workload: Arc::new(workload),
                retry,
            },
        );
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<&RegisteredWorkload> {
        self.entries.get(job_type)
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.entries.contains_key(job_type)
    }

    /// Registered type names, sorted.
    pub fn job_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Retry policy for a job type; unknown types never retry.
    pub fn retry_policy(&self, job_type: &str) -> RetryPolicy {
        self.entries
            .get(job_type)
            .map(|e| e.retry.clone())
            .unwrap_or_default()
    }
}
