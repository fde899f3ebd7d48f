//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the authenticated user from a JWT Bearer token.
//! - [`rbac::RequireWriter`] -- any role allowed to mutate (not `viewer`).
//! - [`rbac::RequireAdmin`] -- the `admin` role.

pub mod auth;
pub mod rbac;
