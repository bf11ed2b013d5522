//! Repository for `image_comments`. Keeps `generated_images.comment_count`
//! in step within the same transaction.

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::comment::{CommentWithAuthor, ImageComment};

const COLUMNS: &str = "id, image_id, user_id, body, created_at, updated_at";

pub struct CommentRepo;

impl CommentRepo {
    /// Add a comment and bump the image's comment count.
    pub async fn create(
        pool: &PgPool,
        image_id: DbId,
        user_id: DbId,
        body: &str,
    ) -> Result<ImageComment, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO image_comments (image_id, user_id, body)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        let comment = sqlx::query_as::<_, ImageComment>(&query)
            .bind(image_id)
            .bind(user_id)
            .bind(body)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE generated_images SET comment_count = COALESCE(comment_count, 0) + 1 WHERE id = $1",
        )
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(comment)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImageComment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM image_comments WHERE id = $1");
        sqlx::query_as::<_, ImageComment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Comments on an image, oldest first, with author usernames.
    pub async fn list_for_image(
        pool: &PgPool,
        image_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CommentWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, CommentWithAuthor>(
            "SELECT c.id, c.image_id, c.user_id, u.username, c.body, c.created_at
             FROM image_comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.image_id = $1
             ORDER BY c.created_at, c.id
             LIMIT $2 OFFSET $3",
        )
        .bind(image_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Delete a comment and decrement the count (never below zero).
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let image_id: Option<DbId> =
            sqlx::query_scalar("DELETE FROM image_comments WHERE id = $1 RETURNING image_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(image_id) = image_id else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE generated_images
             SET comment_count = GREATEST(COALESCE(comment_count, 0) - 1, 0)
             WHERE id = $1",
        )
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
