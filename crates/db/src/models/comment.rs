//! Image comment model.

use muse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `image_comments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageComment {
    pub id: DbId,
    pub image_id: DbId,
    pub user_id: DbId,
    pub body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A comment joined with its author's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommentWithAuthor {
    pub id: DbId,
    pub image_id: DbId,
    pub user_id: DbId,
    pub username: String,
    pub body: String,
    pub created_at: Timestamp,
}
