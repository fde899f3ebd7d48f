//! Entity models and DTOs, one module per table family.

pub mod embedding;
pub mod file;
pub mod job;
pub mod org;
pub mod project;
pub mod user;
