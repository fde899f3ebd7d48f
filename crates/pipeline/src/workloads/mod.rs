//! Built-in workloads.

mod demo;
mod embed_file;
mod nextflow;
mod sample_task;

pub use demo::DemoWorkload;
pub use embed_file::EmbedFileWorkload;
pub use nextflow::NextflowWorkload;
pub use sample_task::SampleTaskWorkload;

use biopilot_core::error::CoreError;

use crate::registry::WorkloadRegistry;

/// Job type names of the built-in workloads.
pub const DEMO: &str = "demo";
pub const SAMPLE_TASK: &str = "sample_task";
pub const EMBED_FILE: &str = "embed_file";
pub const NEXTFLOW: &str = "nextflow";

/// Registry with every built-in workload, none of them retried.
///
/// `nextflow_bin` is the executable used by the `nextflow` workload.
pub fn builtin_registry(nextflow_bin: &str) -> Result<WorkloadRegistry, CoreError> {
    let mut registry = WorkloadRegistry::new();
    registry.register(DEMO, DemoWorkload)?;
    registry.register(SAMPLE_TASK, SampleTaskWorkload)?;
    registry.register(EMBED_FILE, EmbedFileWorkload)?;
    registry.register(NEXTFLOW, NextflowWorkload::new(nextflow_bin))?;
    Ok(registry)
}
