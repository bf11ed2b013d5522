//! Image vote model.

use muse_core::types::{DbId, Timestamp};
use muse_core::voting::VoteType;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `image_votes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageVote {
    pub id: DbId,
    pub image_id: DbId,
    pub user_id: DbId,
    pub vote_type: String,
    pub created_at: Timestamp,
}

/// Tallies after a vote, plus the caller's current vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub image_id: DbId,
    pub upvotes: i32,
    pub downvotes: i32,
    pub user_vote: Option<VoteType>,
}
