//! Repository for `image_votes` and the vote counters on `generated_images`.

use muse_core::types::DbId;
use muse_core::voting::{adjust_counter, apply_vote, VoteType};
use sqlx::PgPool;

use crate::models::vote::VoteTally;

pub struct VoteRepo;

impl VoteRepo {
    /// Cast, switch or retract a vote.
    ///
    /// Voting the same type twice removes the vote; voting the opposite type
    /// switches it. The image row is locked for the whole transaction so
    /// concurrent votes on one image apply one after another. Returns `None`
    /// when the image does not exist.
    pub async fn cast(
        pool: &PgPool,
        image_id: DbId,
        user_id: DbId,
        requested: VoteType,
    ) -> Result<Option<VoteTally>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let counters: Option<(Option<i32>, Option<i32>)> = sqlx::query_as(
            "SELECT upvotes, downvotes FROM generated_images WHERE id = $1 FOR UPDATE",
        )
        .bind(image_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((upvotes, downvotes)) = counters else {
            return Ok(None);
        };

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT vote_type FROM image_votes WHERE image_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(image_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = existing.and_then(|v| VoteType::parse(&v).ok());

        let change = apply_vote(existing, requested);

        match (existing, change.resulting) {
            (None, Some(vote)) => {
                sqlx::query(
                    "INSERT INTO image_votes (image_id, user_id, vote_type) VALUES ($1, $2, $3)",
                )
                .bind(image_id)
                .bind(user_id)
                .bind(vote.as_str())
                .execute(&mut *tx)
                .await?;
            }
            (Some(_), None) => {
                sqlx::query("DELETE FROM image_votes WHERE image_id = $1 AND user_id = $2")
                    .bind(image_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            (Some(_), Some(vote)) => {
                sqlx::query(
                    "UPDATE image_votes SET vote_type = $3 WHERE image_id = $1 AND user_id = $2",
                )
                .bind(image_id)
                .bind(user_id)
                .bind(vote.as_str())
                .execute(&mut *tx)
                .await?;
            }
            (None, None) => {}
        }

        let upvotes = adjust_counter(upvotes, change.upvote_delta);
        let downvotes = adjust_counter(downvotes, change.downvote_delta);
        sqlx::query("UPDATE generated_images SET upvotes = $2, downvotes = $3 WHERE id = $1")
            .bind(image_id)
            .bind(upvotes)
            .bind(downvotes)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(VoteTally {
            image_id,
            upvotes,
            downvotes,
            user_vote: change.resulting,
        }))
    }

    /// Current tallies and the user's own vote. `None` if the image is missing.
    pub async fn tally(
        pool: &PgPool,
        image_id: DbId,
        user_id: DbId,
    ) -> Result<Option<VoteTally>, sqlx::Error> {
        let row: Option<(i32, i32, Option<String>)> = sqlx::query_as(
            "SELECT COALESCE(i.upvotes, 0), COALESCE(i.downvotes, 0), v.vote_type
             FROM generated_images i
             LEFT JOIN image_votes v ON v.image_id = i.id AND v.user_id = $2
             WHERE i.id = $1",
        )
        .bind(image_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(upvotes, downvotes, vote)| VoteTally {
            image_id,
            upvotes,
            downvotes,
            user_vote: vote.and_then(|v| VoteType::parse(&v).ok()),
        }))
    }
}
