//! Role-based access extractors wrapping [`AuthUser`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use biopilot_core::error::CoreError;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires a role that may create, upload, submit or delete.
/// Rejects `viewer` with 403.
pub struct RequireWriter(pub AuthUser);

impl FromRequestParts<AppState> for RequireWriter {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.can_mutate() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Viewers have read-only access".into(),
            )));
        }
        Ok(RequireWriter(user))
    }
}

/// Requires the `admin` role. Rejects with 403 otherwise.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
