use async_trait::async_trait;

use crate::context::WorkloadContext;
use crate::error::WorkloadError;

/// A unit of work the worker pool can run for a job type.
///
/// `run` returns the object-store key of the result artifact, or `None` when
/// the workload produces no artifact. Long-running implementations should
/// watch [`WorkloadContext::cancelled`] and return
/// [`WorkloadError::Cancelled`] promptly once it fires.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn run(&self, ctx: &WorkloadContext) -> Result<Option<String>, WorkloadError>;
}
