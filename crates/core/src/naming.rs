//! Naming rules for job types and object-store keys.
//!
//! Object keys are opaque to the database but must be unique system-wide,
//! so they always embed the owning entity's id.

use crate::error::CoreError;
use crate::types::DbId;

/// Maximum length of a job type name.
const MAX_JOB_TYPE_LEN: usize = 64;

/// Maximum length of a sanitized filename inside an object key.
const MAX_FILENAME_LEN: usize = 200;

/// Maximum length of a file type tag.
pub const MAX_FILE_TYPE_LEN: usize = 32;

/// Compression suffixes skipped when deriving a type tag.
const COMPRESSION_SUFFIXES: &[&str] = &["gz", "bgz", "bz2", "xz", "zst"];

/// Validate a job type name.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_JOB_TYPE_LEN` characters.
/// - Must contain only lowercase alphanumeric, underscore, hyphen or dot.
pub fn validate_job_type(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("Job type must not be empty".into()));
    }
    if name.len() > MAX_JOB_TYPE_LEN {
        return Err(CoreError::Validation(format!(
            "Job type must not exceed {MAX_JOB_TYPE_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
    {
        return Err(CoreError::Validation(format!(
            "Job type '{name}' may only contain lowercase letters, digits, '_', '-' or '.'"
        )));
    }
    Ok(())
}

/// Reduce an uploaded filename to a safe single path segment.
///
/// Directory components are stripped, anything outside `[A-Za-z0-9._-]`
/// becomes `_`, and an empty result falls back to `"upload"`.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Derive a file type tag (`"vcf"`, `"fastq"`, ...) from a filename.
///
/// The last extension wins, lowercased, after dropping a compression
/// suffix, so `reads_R1.FQ.gz` is `"fastq"`. Returns `None` when the
/// name has no usable extension.
pub fn file_type_from_name(filename: &str) -> Option<String> {
    let name = sanitize_filename(filename).to_ascii_lowercase();
    let mut parts = name.rsplit('.');
    let mut ext = parts.next()?;
    if COMPRESSION_SUFFIXES.contains(&ext) {
        ext = parts.next()?;
    }
    // `rsplit` yields the whole name when there is no dot left.
    if ext.is_empty() || ext.len() > MAX_FILE_TYPE_LEN || parts.next().is_none() {
        return None;
    }
    let tag = match ext {
        "fq" => "fastq",
        "fa" | "fna" => "fasta",
        other => other,
    };
    Some(tag.to_string())
}

/// Normalize a client-supplied file type tag.
///
/// Blank input yields `None` so the caller can fall back to
/// [`file_type_from_name`].
pub fn normalize_file_type(tag: &str) -> Result<Option<String>, CoreError> {
    let tag = tag.trim().to_ascii_lowercase();
    if tag.is_empty() {
        return Ok(None);
    }
    if tag.len() > MAX_FILE_TYPE_LEN {
        return Err(CoreError::Validation(format!(
            "File type must not exceed {MAX_FILE_TYPE_LEN} characters"
        )));
    }
    Ok(Some(tag))
}

/// Object key for an uploaded file: `projects/{project}/files/{file}/{name}`.
pub fn file_object_key(project_id: DbId, file_id: DbId, original_filename: &str) -> String {
    format!(
        "projects/{project_id}/files/{file_id}/{}",
        sanitize_filename(original_filename)
    )
}

/// Object key for an artifact produced by a job: `results/{job}/{name}`.
pub fn result_object_key(job_id: DbId, artifact_name: &str) -> String {
    format!("results/{job_id}/{}", sanitize_filename(artifact_name))
}
