//! `sample_task`: ten timed progress steps echoing a word.
//!
//! Parameters: `word` (required), `steps` (default 10), `step_ms`
//! (default 1000). Writes a one-line summary to `results/<job>/sample_task.txt`.

use std::time::Duration;

use async_trait::async_trait;
use biopilot_core::naming::result_object_key;
use bytes::Bytes;
use serde::Deserialize;

use crate::context::WorkloadContext;
use crate::error::WorkloadError;
use crate::workload::Workload;

#[derive(Debug, Deserialize)]
struct SampleParams {
    word: String,
    #[serde(default = "default_steps")]
    steps: u32,
    #[serde(default = "default_step_ms")]
    step_ms: u64,
}

fn default_steps() -> u32 {
    10
}

fn default_step_ms() -> u64 {
    1000
}

pub struct SampleTaskWorkload;

#[async_trait]
impl Workload for SampleTaskWorkload {
    async fn run(&self, ctx: &WorkloadContext) -> Result<Option<String>, WorkloadError> {
        let params: SampleParams = ctx.params()?;
        if params.steps == 0 {
            return Err(WorkloadError::InvalidParameters(
                "steps must be at least 1".into(),
            ));
        }

        for i in 1..=params.steps {
            ctx.check_cancelled()?;
            ctx.log
                .info(format!("processing {} {i}/{}", params.word, params.steps))
                .await;
            ctx.sleep(Duration::from_millis(params.step_ms)).await?;
        }

        let summary = format!("Sample task complete: {}", params.word);
        let key = result_object_key(ctx.job_id, "sample_task.txt");
        ctx.services.storage.put(&key, Bytes::from(summary.clone())).await?;
        ctx.log.info(summary).await;
        Ok(Some(key))
    }
}
