//! Job lifecycle state machine.
//!
//! ```text
//! PENDING -> QUEUED -> RUNNING -> COMPLETED
//!                             \-> FAILED
//! ```
//!
//! PENDING and QUEUED are pre-execution, RUNNING is the only in-progress
//! state, COMPLETED and FAILED are terminal. No step may be skipped and
//! nothing leaves a terminal state.

use crate::error::CoreError;
use crate::status::define_status_enum;
use crate::types::DbId;

define_status_enum! {
    /// Background job execution status.
    JobStatus {
        Pending = 1 => "PENDING",
        Queued = 2 => "QUEUED",
        Running = 3 => "RUNNING",
        Completed = 4 => "COMPLETED",
        Failed = 5 => "FAILED",
    }
}

impl JobStatus {
    /// The only status a fresh job may be created in.
    pub const INITIAL: JobStatus = JobStatus::Pending;

    /// COMPLETED and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// PENDING and QUEUED: the workload has not been touched yet.
    pub fn is_pre_execution(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Queued)
    }

    /// Whether a job in this status must carry `started_at`.
    pub fn has_started(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Completed | JobStatus::Failed
        )
    }

    /// Whether a job in this status must carry `finished_at`.
    pub fn has_finished(self) -> bool {
        self.is_terminal()
    }

    /// Statuses reachable from `self` in one step.
    pub fn successors(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Queued],
            JobStatus::Queued => &[JobStatus::Running],
            JobStatus::Running => &[JobStatus::Completed, JobStatus::Failed],
            JobStatus::Completed | JobStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self.successors().contains(&next)
    }
}

/// Validate a single status step for `job_id`.
pub fn validate_transition(
    job_id: DbId,
    from: JobStatus,
    to: JobStatus,
) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { job_id, from, to })
    }
}

/// Check the timestamp invariants for a job snapshot.
///
/// `started_at` is present iff the job has started, `finished_at` iff it is
/// terminal.
pub fn timestamps_consistent(status: JobStatus, started: bool, finished: bool) -> bool {
    status.has_started() == started && status.has_finished() == finished
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::types::new_id;

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Pending.id(), 1);
        assert_eq!(JobStatus::Queued.id(), 2);
        assert_eq!(JobStatus::Running.id(), 3);
        assert_eq!(JobStatus::Completed.id(), 4);
        assert_eq!(JobStatus::Failed.id(), 5);
    }

    #[test]
    fn from_id_round_trips_every_variant() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_id(status.id()), Some(*status));
        }
        assert_eq!(JobStatus::from_id(0), None);
        assert_eq!(JobStatus::from_id(6), None);
    }

    #[test]
    fn happy_path_is_legal() {
        let id = new_id();
        assert!(validate_transition(id, JobStatus::Pending, JobStatus::Queued).is_ok());
        assert!(validate_transition(id, JobStatus::Queued, JobStatus::Running).is_ok());
        assert!(validate_transition(id, JobStatus::Running, JobStatus::Completed).is_ok());
        assert!(validate_transition(id, JobStatus::Running, JobStatus::Failed).is_ok());
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let id = new_id();
        assert_matches!(
            validate_transition(id, JobStatus::Pending, JobStatus::Running),
            Err(CoreError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Running,
                ..
            })
        );
        assert!(validate_transition(id, JobStatus::Queued, JobStatus::Completed).is_err());
        assert!(validate_transition(id, JobStatus::Pending, JobStatus::Failed).is_err());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in [JobStatus::Completed, JobStatus::Failed] {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn no_transition_goes_backwards() {
        for from in JobStatus::ALL {
            for to in from.successors() {
                assert!(to.id() > from.id(), "{from} -> {to} is not monotonic");
            }
        }
    }

    #[test]
    fn timestamp_invariants() {
        assert!(timestamps_consistent(JobStatus::Pending, false, false));
        assert!(timestamps_consistent(JobStatus::Queued, false, false));
        assert!(timestamps_consistent(JobStatus::Running, true, false));
        assert!(timestamps_consistent(JobStatus::Completed, true, true));
        assert!(timestamps_consistent(JobStatus::Failed, true, true));

        assert!(!timestamps_consistent(JobStatus::Running, false, false));
        assert!(!timestamps_consistent(JobStatus::Queued, true, false));
        assert!(!timestamps_consistent(JobStatus::Completed, true, false));
    }

    #[test]
    fn serializes_as_uppercase_name() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let parsed: JobStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, JobStatus::Completed);
        assert!(serde_json::from_str::<JobStatus>("\"CANCELLED\"").is_err());
    }
}
