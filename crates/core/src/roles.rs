//! Well-known role name constants.
//!
//! These must match the seed data in `20261001000001_create_users.sql`.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_USER: &str = "user";

/// All assignable role names.
pub const ALL_ROLES: [&str; 3] = [ROLE_ADMIN, ROLE_MODERATOR, ROLE_USER];

/// Whether the role may act on the moderation queue.
pub fn can_moderate(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_MODERATOR
}
