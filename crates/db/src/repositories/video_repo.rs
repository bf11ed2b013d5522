//! Repository for the `generated_videos` table.
//!
//! Same transition rules as images: only non-terminal rows move.

use muse_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::video::{CreateVideo, GalleryVideo, GeneratedVideo};

const COLUMNS: &str = "id, user_id, source_image_id, character_id, kind, prompt, audio_url, \
                       duration_secs, status, provider_job_id, video_url, cdn_path, error_message, \
                       nuts_cost, is_public, moderation_status, moderation_note, moderated_by, \
                       moderated_at, completed_at, created_at, updated_at";

const GALLERY_COLUMNS: &str = "v.id, v.user_id, u.username, v.source_image_id, v.character_id, \
                               v.kind, v.prompt, v.video_url, v.duration_secs, v.created_at";

pub struct VideoRepo;

impl VideoRepo {
    /// Insert a pending video job.
    pub async fn create(pool: &PgPool, input: &CreateVideo) -> Result<GeneratedVideo, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_videos
                (user_id, source_image_id, character_id, kind, prompt, audio_url, duration_secs,
                 nuts_cost, is_public, moderation_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                     CASE WHEN $9 THEN 'pending' ELSE 'private' END)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(input.user_id)
            .bind(input.source_image_id)
            .bind(input.character_id)
            .bind(&input.kind)
            .bind(&input.prompt)
            .bind(&input.audio_url)
            .bind(input.duration_secs)
            .bind(input.nuts_cost)
            .bind(input.is_public)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_videos WHERE id = $1");
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// A user's videos, newest first, optionally filtered by status.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_videos
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(user_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Public, approved, completed videos with their author, newest first.
    pub async fn gallery(
        pool: &PgPool,
        character_id: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GalleryVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {GALLERY_COLUMNS} FROM generated_videos v
             JOIN users u ON u.id = v.user_id
             WHERE v.is_public = true
               AND v.moderation_status = 'approved'
               AND v.status = 'completed'
               AND ($1::BIGINT IS NULL OR v.character_id = $1)
             ORDER BY v.created_at DESC, v.id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, GalleryVideo>(&query)
            .bind(character_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Completed videos with the given moderation status, oldest first.
    pub async fn moderation_queue(
        pool: &PgPool,
        moderation_status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_videos
             WHERE moderation_status = $1 AND status = 'completed'
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(moderation_status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_by_moderation_status(
        pool: &PgPool,
        moderation_status: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM generated_videos WHERE moderation_status = $1 AND status = 'completed'",
        )
        .bind(moderation_status)
        .fetch_one(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM generated_videos")
            .fetch_one(pool)
            .await
    }

    pub async fn set_visibility(
        pool: &PgPool,
        id: DbId,
        is_public: bool,
        moderation_status: &str,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_videos SET is_public = $2, moderation_status = $3
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .bind(is_public)
            .bind(moderation_status)
            .fetch_optional(pool)
            .await
    }

    pub async fn moderate(
        pool: &PgPool,
        id: DbId,
        moderation_status: &str,
        note: Option<&str>,
        moderator_id: DbId,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_videos SET
                moderation_status = $2,
                moderation_note = $3,
                moderated_by = $4,
                moderated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .bind(moderation_status)
            .bind(note)
            .bind(moderator_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_provider_job_id(
        pool: &PgPool,
        id: DbId,
        provider_job_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE generated_videos SET provider_job_id = $2 WHERE id = $1")
            .bind(id)
            .bind(provider_job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_processing(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_videos SET status = 'processing'
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        video_url: &str,
        cdn_path: &str,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_videos SET
                status = 'completed',
                video_url = $2,
                cdn_path = $3,
                error_message = NULL,
                completed_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'processing')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .bind(video_url)
            .bind(cdn_path)
            .fetch_optional(pool)
            .await
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "UPDATE generated_videos SET
                status = 'failed',
                error_message = $2,
                completed_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'processing')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_open_jobs(
        pool: &PgPool,
        created_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_videos
             WHERE status IN ('pending', 'processing') AND created_at <= $1
             ORDER BY created_at
             LIMIT $2"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(created_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!("DELETE FROM generated_videos WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
