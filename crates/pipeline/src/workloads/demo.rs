//! `demo`: produces a small artifact at `out/demo-<n>.tar`.
//!
//! Parameters:
//! - `n` (default 1): artifact number.
//! - `sleep_ms` (default 0): simulated work before writing, cut short by
//!   cancellation unless `ignore_cancel` is set.
//! - `fail`: when present, the run fails with this message instead.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::context::WorkloadContext;
use crate::error::WorkloadError;
use crate::workload::Workload;

#[derive(Debug, Deserialize)]
struct DemoParams {
    #[serde(default = "default_n")]
    n: u32,
    #[serde(default)]
    sleep_ms: u64,
    #[serde(default)]
    ignore_cancel: bool,
    #[serde(default)]
    fail: Option<String>,
}

fn default_n() -> u32 {
    1
}

pub struct DemoWorkload;

#[async_trait]
impl Workload for DemoWorkload {
    async fn run(&self, ctx: &WorkloadContext) -> Result<Option<String>, WorkloadError> {
        let params: DemoParams = ctx.params()?;
        ctx.log.info(format!("demo run n={}", params.n)).await;

        if params.sleep_ms > 0 {
            let pause = Duration::from_millis(params.sleep_ms);
            if params.ignore_cancel {
                tokio::time::sleep(pause).await;
            } else {
                ctx.sleep(pause).await?;
            }
        }

        if let Some(message) = params.fail {
            return Err(WorkloadError::Failed(message));
        }

        let key = format!("out/demo-{}.tar", params.n);
        let payload = format!("demo artifact {} for job {}\n", params.n, ctx.job_id);
        ctx.services.storage.put(&key, Bytes::from(payload)).await?;
        ctx.log.info(format!("wrote {key}")).await;
        Ok(Some(key))
    }
}
