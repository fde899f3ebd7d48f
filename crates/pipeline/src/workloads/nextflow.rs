//! `nextflow`: run a Nextflow pipeline as a child process.
//!
//! Parameters:
//! - `pipeline` (required): pipeline name, path or repository.
//! - `profile`: passed as `-profile`.
//! - `params`: object of pipeline parameters, passed as `--key value`.
//! - `args`: extra raw arguments appended last.
//!
//! Stdout lines are mirrored into the job log (up to a cap) and the full
//! output is stored at `results/<job>/nextflow.log`. The child is killed on
//! cancellation and when the run is aborted.
//!
//! Each run gets `<work_root>/<job id>` as its working directory, removed
//! again however the run ends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use biopilot_core::naming::result_object_key;
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::context::{JobLog, WorkloadContext};
use crate::error::WorkloadError;
use crate::workload::Workload;

/// Stdout lines copied into the job log before going quiet.
const MAX_LOGGED_LINES: usize = 500;

/// Stderr lines kept for the failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Deserialize)]
struct NextflowParams {
    pipeline: String,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    args: Vec<String>,
}

impl NextflowParams {
    fn validate(&self) -> Result<(), WorkloadError> {
        if self.pipeline.trim().is_empty() || self.pipeline.starts_with('-') {
            return Err(WorkloadError::InvalidParameters(
                "pipeline must be a non-empty name or path".into(),
            ));
        }
        if let Some(key) = self
            .params
            .keys()
            .find(|k| k.is_empty() || !k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(WorkloadError::InvalidParameters(format!(
                "invalid pipeline parameter name '{key}'"
            )));
        }
        Ok(())
    }

    fn command_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), self.pipeline.clone()];
        if let Some(profile) = &self.profile {
            args.push("-profile".into());
            args.push(profile.clone());
        }
        for (key, value) in &self.params {
            args.push(format!("--{key}"));
            args.push(match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        args.extend(self.args.iter().cloned());
        args
    }
}

pub struct NextflowWorkload {
    binary: String,
    work_root: PathBuf,
}

impl NextflowWorkload {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            work_root: std::env::temp_dir().join("biopilot-nextflow"),
        }
    }

    /// Run each job in its own directory under `work_root`.
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }
}

#[async_trait]
impl Workload for NextflowWorkload {
    async fn run(&self, ctx: &WorkloadContext) -> Result<Option<String>, WorkloadError> {
        let params: NextflowParams = ctx.params()?;
        params.validate()?;

        let work_dir = WorkDir::create(self.work_root.join(ctx.job_id.to_string())).await?;
        let result = self.run_in(ctx, &params, work_dir.path()).await;
        work_dir.remove().await;
        result
    }
}

impl NextflowWorkload {
    async fn run_in(
        &self,
        ctx: &WorkloadContext,
        params: &NextflowParams,
        work_dir: &Path,
    ) -> Result<Option<String>, WorkloadError> {
        let args = params.command_args();
        ctx.log
            .info(format!("$ {} {}", self.binary, args.join(" ")))
            .await;

        // `kill_on_drop` covers the hard-limit abort, which drops this future.
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_task = tokio::spawn(mirror_stdout(child.stdout.take(), ctx.log.clone()));
        let stderr_task = tokio::spawn(tail_lines(child.stderr.take(), STDERR_TAIL_LINES));

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = ctx.cancelled() => None,
        };

        let status = match waited {
            Some(status) => status?,
            None => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(job_id = %ctx.job_id, error = %e, "Failed to kill nextflow");
                }
                ctx.log.warn("nextflow process killed").await;
                return Err(WorkloadError::Cancelled);
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(WorkloadError::Failed(format!(
                "nextflow exited with {code}\n{}",
                stderr_tail.join("\n")
            )));
        }

        let key = result_object_key(ctx.job_id, "nextflow.log");
        ctx.services.storage.put(&key, Bytes::from(stdout)).await?;
        Ok(Some(key))
    }
}

/// Per-job working directory.
///
/// Removed by [`WorkDir::remove`] on normal return; if the run future is
/// dropped mid-flight (hard-limit abort) `Drop` schedules the removal.
struct WorkDir {
    path: PathBuf,
    removed: bool,
}

impl WorkDir {
    async fn create(path: PathBuf) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, removed: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        remove_work_dir(self.path.clone()).await;
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(remove_work_dir(path));
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove nextflow work dir");
                }
            }
        }
    }
}

async fn remove_work_dir(path: PathBuf) {
    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed nextflow work dir"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove nextflow work dir"),
    }
}

/// Copy lines into the job log (capped) and return the whole output.
async fn mirror_stdout<R: AsyncRead + Unpin>(stream: Option<R>, log: JobLog) -> String {
    let mut captured = String::new();
    let Some(stream) = stream else {
        return captured;
    };
    let mut lines = BufReader::new(stream).lines();
    let mut logged = 0usize;
    while let Ok(Some(line)) = lines.next_line().await {
        if logged < MAX_LOGGED_LINES {
            log.info(&line).await;
            logged += 1;
        }
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

/// Keep the last `keep` lines of a stream.
async fn tail_lines<R: AsyncRead + Unpin>(stream: Option<R>, keep: usize) -> Vec<String> {
    let mut tail = std::collections::VecDeque::with_capacity(keep);
    if let Some(stream) = stream {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail.into_iter().collect()
}
