//! Generated image model and DTOs.

use muse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `generated_images` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedImage {
    pub id: DbId,
    pub user_id: DbId,
    pub category_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub parent_image_id: Option<DbId>,
    pub kind: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing)]
    pub full_prompt: String,
    pub style: Option<String>,
    pub width: i32,
    pub height: i32,
    pub seed: Option<i64>,
    pub status: String,
    #[serde(skip_serializing)]
    pub provider_job_id: Option<String>,
    pub image_url: Option<String>,
    #[serde(skip_serializing)]
    pub cdn_path: Option<String>,
    pub error_message: Option<String>,
    pub nuts_cost: i64,
    pub is_public: bool,
    pub moderation_status: String,
    pub moderation_note: Option<String>,
    pub moderated_by: Option<DbId>,
    pub moderated_at: Option<Timestamp>,
    pub upvotes: Option<i32>,
    pub downvotes: Option<i32>,
    pub comment_count: Option<i32>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a pending image job.
#[derive(Debug, Clone)]
pub struct CreateImage {
    pub user_id: DbId,
    pub category_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub parent_image_id: Option<DbId>,
    pub kind: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub full_prompt: String,
    pub style: Option<String>,
    pub width: i32,
    pub height: i32,
    pub seed: Option<i64>,
    pub nuts_cost: i64,
    pub is_public: bool,
}

/// A gallery entry: a public, approved image with its author.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GalleryImage {
    pub id: DbId,
    pub user_id: DbId,
    pub username: String,
    pub category_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub prompt: String,
    pub style: Option<String>,
    pub width: i32,
    pub height: i32,
    pub image_url: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub comment_count: i32,
    pub created_at: Timestamp,
}

/// Filters for the gallery listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GalleryQuery {
    pub category_id: Option<DbId>,
    pub character_id: Option<DbId>,
    /// `new` (default) or `top`.
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Filters for the owner's image listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ImageListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Gallery ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GallerySort {
    /// Newest first.
    #[default]
    New,
    /// Highest score (upvotes minus downvotes) first.
    Top,
}

impl GallerySort {
    /// Parse the `sort` query value; anything unknown falls back to `New`.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("top") => GallerySort::Top,
            _ => GallerySort::New,
        }
    }
}
