use biopilot_core::error::CoreError;

/// Error returned by repository operations that enforce domain rules.
///
/// Plain CRUD methods return `sqlx::Error` directly; operations that can
/// fail with `NotFound`, `InvalidTransition` or `Validation` return this.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed (connection-level trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Core(_) => false,
            StoreError::Database(e) => is_transient_sqlx(e),
        }
    }
}

/// Classify sqlx errors caused by connectivity rather than by the query.
pub fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
    )
}

/// PostgreSQL unique constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
