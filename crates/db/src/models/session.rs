//! Refresh sessions.
//!
//! Every refresh token is single-use. Spending one links the spent row to
//! its replacement through `replaced_by`, so a rotation chain can be
//! followed per device.

use muse_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `refresh_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub id: DbId,
    pub user_id: DbId,
    pub token_hash: String,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub replaced_by: Option<DbId>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
}

pub struct NewRefreshSession<'a> {
    pub user_id: DbId,
    pub token_hash: &'a str,
    pub expires_at: Timestamp,
    pub user_agent: Option<&'a str>,
    /// The session this one rotates out, if any.
    pub rotated_from: Option<DbId>,
}
