//! One-time email verification / password reset tokens.

use muse_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `auth_tokens` table. Only the token hash is stored.
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub id: DbId,
    pub user_id: DbId,
    pub purpose: String,
    pub token_hash: String,
    pub expires_at: Timestamp,
    pub consumed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
