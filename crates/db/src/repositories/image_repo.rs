//! Repository for the `generated_images` table.
//!
//! Status transitions only ever leave `pending`/`processing`; once a row is
//! `completed` or `failed` the `mark_*` methods match nothing and return
//! `None`, which makes duplicate provider callbacks harmless.

use muse_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::image::{CreateImage, GalleryImage, GallerySort, GeneratedImage};

const COLUMNS: &str = "id, user_id, category_id, character_id, parent_image_id, kind, prompt, \
                       negative_prompt, full_prompt, style, width, height, seed, status, \
                       provider_job_id, image_url, cdn_path, error_message, nuts_cost, is_public, \
                       moderation_status, moderation_note, moderated_by, moderated_at, upvotes, \
                       downvotes, comment_count, completed_at, created_at, updated_at";

const GALLERY_COLUMNS: &str = "i.id, i.user_id, u.username, i.category_id, i.character_id, \
                               i.prompt, i.style, i.width, i.height, i.image_url, \
                               COALESCE(i.upvotes, 0) AS upvotes, \
                               COALESCE(i.downvotes, 0) AS downvotes, \
                               COALESCE(i.comment_count, 0) AS comment_count, i.created_at";

pub struct ImageRepo;

impl ImageRepo {
    /// Insert a pending image job.
    pub async fn create(pool: &PgPool, input: &CreateImage) -> Result<GeneratedImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_images
                (user_id, category_id, character_id, parent_image_id, kind, prompt,
                 negative_prompt, full_prompt, style, width, height, seed, nuts_cost, is_public,
                 moderation_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                     CASE WHEN $14 THEN 'pending' ELSE 'private' END)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(input.user_id)
            .bind(input.category_id)
            .bind(input.character_id)
            .bind(input.parent_image_id)
            .bind(&input.kind)
            .bind(&input.prompt)
            .bind(&input.negative_prompt)
            .bind(&input.full_prompt)
            .bind(&input.style)
            .bind(input.width)
            .bind(input.height)
            .bind(input.seed)
            .bind(input.nuts_cost)
            .bind(input.is_public)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_images WHERE id = $1");
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// A user's images, newest first, optionally filtered by status.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Public, approved, completed images with their author.
    pub async fn gallery(
        pool: &PgPool,
        category_id: Option<DbId>,
        character_id: Option<DbId>,
        sort: GallerySort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GalleryImage>, sqlx::Error> {
        let order = match sort {
            GallerySort::New => "i.created_at DESC, i.id DESC",
            GallerySort::Top => {
                "(COALESCE(i.upvotes, 0) - COALESCE(i.downvotes, 0)) DESC, i.created_at DESC, i.id DESC"
            }
        };
        let query = format!(
            "SELECT {GALLERY_COLUMNS} FROM generated_images i
             JOIN users u ON u.id = i.user_id
             WHERE i.is_public = true
               AND i.moderation_status = 'approved'
               AND i.status = 'completed'
               AND ($1::BIGINT IS NULL OR i.category_id = $1)
               AND ($2::BIGINT IS NULL OR i.character_id = $2)
             ORDER BY {order}
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, GalleryImage>(&query)
            .bind(category_id)
            .bind(character_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Images awaiting (or past) review with the given moderation status,
    /// oldest first.
    pub async fn moderation_queue(
        pool: &PgPool,
        moderation_status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images
             WHERE moderation_status = $1 AND status = 'completed'
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(moderation_status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Number of completed images with the given moderation status.
    pub async fn count_by_moderation_status(
        pool: &PgPool,
        moderation_status: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM generated_images WHERE moderation_status = $1 AND status = 'completed'",
        )
        .bind(moderation_status)
        .fetch_one(pool)
        .await
    }

    /// Total images ever requested.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM generated_images")
            .fetch_one(pool)
            .await
    }

    /// Owner toggles publication; the caller computes the moderation status.
    pub async fn set_visibility(
        pool: &PgPool,
        id: DbId,
        is_public: bool,
        moderation_status: &str,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_images SET is_public = $2, moderation_status = $3
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .bind(is_public)
            .bind(moderation_status)
            .fetch_optional(pool)
            .await
    }

    /// Record a moderation decision.
    pub async fn moderate(
        pool: &PgPool,
        id: DbId,
        moderation_status: &str,
        note: Option<&str>,
        moderator_id: DbId,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_images SET
                moderation_status = $2,
                moderation_note = $3,
                moderated_by = $4,
                moderated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .bind(moderation_status)
            .bind(note)
            .bind(moderator_id)
            .fetch_optional(pool)
            .await
    }

    /// Remember the provider's job id after submission.
    pub async fn set_provider_job_id(
        pool: &PgPool,
        id: DbId,
        provider_job_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE generated_images SET provider_job_id = $2 WHERE id = $1")
            .bind(id)
            .bind(provider_job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// `pending` -> `processing`.
    pub async fn mark_processing(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_images SET status = 'processing'
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Non-terminal -> `completed` with the stored media location.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        image_url: &str,
        cdn_path: &str,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_images SET
                status = 'completed',
                image_url = $2,
                cdn_path = $3,
                error_message = NULL,
                completed_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'processing')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .bind(image_url)
            .bind(cdn_path)
            .fetch_optional(pool)
            .await
    }

    /// Non-terminal -> `failed`.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_images SET
                status = 'failed',
                error_message = $2,
                completed_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'processing')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }

    /// Jobs still open that were created at or before `created_before`.
    pub async fn list_open_jobs(
        pool: &PgPool,
        created_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<GeneratedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_images
             WHERE status IN ('pending', 'processing') AND created_at <= $1
             ORDER BY created_at
             LIMIT $2"
        );
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(created_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete an image, returning the removed row so its media can be purged.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<GeneratedImage>, sqlx::Error> {
        let query = format!("DELETE FROM generated_images WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, GeneratedImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
