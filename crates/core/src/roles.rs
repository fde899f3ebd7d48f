//! User roles.
//!
//! These must match the seed data of the `roles` lookup table.

use crate::status::define_status_enum;

define_status_enum! {
    /// Role attached to every user account.
    UserRole {
        Admin = 1 => "admin",
        User = 2 => "user",
        Viewer = 3 => "viewer",
    }
}

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_VIEWER: &str = "viewer";

impl UserRole {
    /// Viewers may read but never create, upload, submit or delete.
    pub fn can_mutate(self) -> bool {
        !matches!(self, UserRole::Viewer)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_match_constants() {
        assert_eq!(UserRole::Admin.as_str(), ROLE_ADMIN);
        assert_eq!(UserRole::User.as_str(), ROLE_USER);
        assert_eq!(UserRole::Viewer.as_str(), ROLE_VIEWER);
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(UserRole::Admin.can_mutate());
        assert!(UserRole::User.can_mutate());
        assert!(!UserRole::Viewer.can_mutate());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(UserRole::from_name("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_name("owner"), None);
    }
}
