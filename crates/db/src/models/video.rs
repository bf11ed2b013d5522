//! Generated video model and DTOs.

use muse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `generated_videos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedVideo {
    pub id: DbId,
    pub user_id: DbId,
    pub source_image_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub kind: String,
    pub prompt: Option<String>,
    pub audio_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub status: String,
    #[serde(skip_serializing)]
    pub provider_job_id: Option<String>,
    pub video_url: Option<String>,
    #[serde(skip_serializing)]
    pub cdn_path: Option<String>,
    pub error_message: Option<String>,
    pub nuts_cost: i64,
    pub is_public: bool,
    pub moderation_status: String,
    pub moderation_note: Option<String>,
    pub moderated_by: Option<DbId>,
    pub moderated_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a pending video job.
#[derive(Debug, Clone)]
pub struct CreateVideo {
    pub user_id: DbId,
    pub source_image_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub kind: String,
    pub prompt: Option<String>,
    pub audio_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub nuts_cost: i64,
    pub is_public: bool,
}

/// A public, approved video with its author.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GalleryVideo {
    pub id: DbId,
    pub user_id: DbId,
    pub username: String,
    pub source_image_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub kind: String,
    pub prompt: Option<String>,
    pub video_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub created_at: Timestamp,
}

/// Filters for the owner's video listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VideoListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
