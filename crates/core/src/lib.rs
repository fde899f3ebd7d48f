//! Pure domain building blocks for the BioPilot orchestration core.
//!
//! Nothing in here talks to the database, the broker or the object store.
//! Repositories, the worker harness and the HTTP layer all build on these
//! types so that the job state machine has exactly one definition.

pub mod backoff;
pub mod chunking;
pub mod error;
pub mod job_log;
pub mod job_status;
pub mod limits;
pub mod naming;
pub mod retry;
pub mod roles;
pub mod status;
pub mod types;
