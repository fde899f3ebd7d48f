pub mod auth;
pub mod files;
pub mod jobs;
pub mod orgs;
pub mod projects;
pub mod users;
