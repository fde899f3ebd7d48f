//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod embedding_repo;
pub mod file_repo;
pub mod job_repo;
pub mod org_repo;
pub mod project_repo;
pub mod user_repo;

pub use embedding_repo::EmbeddingRepo;
pub use file_repo::FileRepo;
pub use job_repo::JobRepo;
pub use org_repo::OrgRepo;
pub use project_repo::ProjectRepo;
pub use user_repo::UserRepo;
