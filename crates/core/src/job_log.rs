//! Job log conventions.
//!
//! A job's log is an ordered sequence of timestamped entries. Failure paths
//! prefix their entry with one of the markers below so clients (and tests)
//! can tell a timeout from a workload error without parsing free text.

use crate::types::Timestamp;

pub const LEVEL_INFO: &str = "info";
pub const LEVEL_WARN: &str = "warn";
pub const LEVEL_ERROR: &str = "error";

/// Soft time limit reached; the workload was asked to stop.
pub const MARKER_SOFT_TIMEOUT: &str = "[timeout:soft]";
/// Hard time limit reached; execution was aborted.
pub const MARKER_HARD_TIMEOUT: &str = "[timeout:hard]";
/// A redelivered task found its job still RUNNING under the same message.
pub const MARKER_STALE_CLAIM: &str = "[stale claim]";
/// The job was cancelled on request.
pub const MARKER_CANCELLED: &str = "[cancelled]";
/// The workload returned an error.
pub const MARKER_WORKLOAD_ERROR: &str = "[workload error]";

/// Maximum size of a single log entry; longer text is truncated.
pub const MAX_ENTRY_LEN: usize = 16 * 1024;

/// Trim an entry to [`MAX_ENTRY_LEN`] bytes on a char boundary.
pub fn truncate_entry(text: &str) -> &str {
    if text.len() <= MAX_ENTRY_LEN {
        return text;
    }
    let mut end = MAX_ENTRY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Render one entry the way the job query API shows it.
pub fn format_entry(logged_at: &Timestamp, level: &str, message: &str) -> String {
    format!(
        "{} [{}] {}",
        logged_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        level.to_uppercase(),
        message
    )
}

/// Join rendered entries into the single text block exposed as `logs`.
///
/// Returns `None` when there are no entries.
pub fn render<'a, I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a Timestamp, &'a str, &'a str)>,
{
    let lines: Vec<String> = entries
        .into_iter()
        .map(|(at, level, msg)| format_entry(at, level, msg))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
