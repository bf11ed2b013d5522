//! Handlers for `/videos`: image-to-video generation and the video gallery.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::credits::{reasons, UsageKind};
use muse_core::generation::{
    validate_video_duration, GenerationStatus, DEFAULT_VIDEO_DURATION_SECS, VIDEO_KIND_IMG2VIDEO,
};
use muse_core::moderation::{status_after_visibility_change, ModerationStatus};
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::types::DbId;
use muse_db::models::image::GalleryQuery;
use muse_db::models::video::{CreateVideo, GalleryVideo, GeneratedVideo, VideoListQuery};
use muse_db::repositories::VideoRepo;
use muse_providers::GpuInput;
use serde::Deserialize;

use crate::engine::credits;
use crate::engine::jobs::{self, JobRow};
use crate::error::{AppError, AppResult};
use crate::handlers::images::{find_image, VisibilityRequest};
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateVideoRequest {
    pub image_id: DbId,
    pub prompt: Option<String>,
    pub duration_secs: Option<i32>,
    pub is_public: Option<bool>,
}

/// POST /api/v1/videos/generate
///
/// Animate one of the caller's completed images.
pub async fn generate(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<GenerateVideoRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedVideo>>)> {
    let duration = input.duration_secs.unwrap_or(DEFAULT_VIDEO_DURATION_SECS);
    validate_video_duration(duration)?;
    let prompt = input
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    if prompt.as_ref().is_some_and(|p| p.chars().count() > 1000) {
        return Err(AppError::BadRequest(
            "Prompt must be at most 1000 characters".into(),
        ));
    }

    let source = find_image(&state, input.image_id).await?;
    if source.user_id != auth_user.user_id {
        return Err(AppError::forbidden("You can only animate your own images"));
    }
    let image_url = match (source.status.as_str(), source.image_url.as_deref()) {
        ("completed", Some(url)) => url.to_string(),
        _ => {
            return Err(AppError::BadRequest(
                "Only completed images can be animated".into(),
            ))
        }
    };

    let cost = state.config.credits.costs.video;
    credits::charge(
        &state,
        auth_user.user_id,
        UsageKind::Video,
        cost,
        reasons::VIDEO_GENERATION,
    )
    .await?;

    let create = CreateVideo {
        user_id: auth_user.user_id,
        source_image_id: Some(source.id),
        character_id: source.character_id,
        kind: VIDEO_KIND_IMG2VIDEO.to_string(),
        prompt: prompt.clone(),
        audio_url: None,
        duration_secs: Some(duration),
        nuts_cost: cost,
        is_public: input.is_public.unwrap_or(false),
    };
    let video = insert_or_refund(&state, &create).await?;

    let job = JobRow::from_video(&video);
    jobs::submit(
        &state,
        &job,
        &GpuInput::Img2Video {
            image_url,
            prompt,
            duration_secs: duration,
        },
    )
    .await?;

    let video = reload(&state, video).await?;
    tracing::info!(
        user_id = auth_user.user_id,
        video_id = video.id,
        source_image_id = source.id,
        "Video generation queued"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: video })))
}

/// GET /api/v1/videos
pub async fn list_own(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<VideoListQuery>,
) -> AppResult<Json<DataResponse<Vec<GeneratedVideo>>>> {
    if let Some(status) = params.status.as_deref() {
        GenerationStatus::parse(status)?;
    }
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);

    let videos = VideoRepo::list_for_user(
        &state.pool,
        auth_user.user_id,
        params.status.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: videos }))
}

/// GET /api/v1/videos/{id}
pub async fn get_video(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<GeneratedVideo>>> {
    let video = find_video(&state, id).await?;
    if !can_view(&video, viewer.as_ref()) {
        return Err(AppError::not_found("Video", id));
    }
    Ok(Json(DataResponse { data: video }))
}

/// GET /api/v1/gallery/videos
///
/// Only `character_id`, `limit` and `offset` apply; videos are always
/// newest first.
pub async fn gallery(
    State(state): State<AppState>,
    Query(params): Query<GalleryQuery>,
) -> AppResult<Json<DataResponse<Vec<GalleryVideo>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let videos = VideoRepo::gallery(&state.pool, params.character_id, limit, offset).await?;
    Ok(Json(DataResponse { data: videos }))
}

/// PATCH /api/v1/videos/{id}
pub async fn set_visibility(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<VisibilityRequest>,
) -> AppResult<Json<DataResponse<GeneratedVideo>>> {
    let video = find_video(&state, id).await?;
    if video.user_id != auth_user.user_id {
        return Err(AppError::forbidden("You can only change your own videos"));
    }

    let current = ModerationStatus::parse(&video.moderation_status)?;
    let next = status_after_visibility_change(current, input.is_public);
    let video = VideoRepo::set_visibility(&state.pool, id, input.is_public, next.as_str())
        .await?
        .ok_or_else(|| AppError::not_found("Video", id))?;

    tracing::info!(video_id = id, is_public = input.is_public, moderation = next.as_str(), "Video visibility changed");
    Ok(Json(DataResponse { data: video }))
}

/// DELETE /api/v1/videos/{id}
pub async fn delete_video(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let video = find_video(&state, id).await?;
    if !auth_user.owns_or_moderates(video.user_id) {
        return Err(AppError::forbidden("You can only delete your own videos"));
    }

    let deleted = VideoRepo::delete(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Video", id))?;

    if let Some(path) = deleted.cdn_path.as_deref() {
        if let Err(e) = state.storage.delete(path).await {
            tracing::warn!(video_id = id, path, error = %e, "Failed to delete video from storage");
        }
    }
    tracing::info!(video_id = id, deleted_by = auth_user.user_id, "Video deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn find_video(state: &AppState, id: DbId) -> AppResult<GeneratedVideo> {
    VideoRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Video", id))
}

fn can_view(video: &GeneratedVideo, viewer: Option<&AuthUser>) -> bool {
    if viewer.is_some_and(|v| v.owns_or_moderates(video.user_id)) {
        return true;
    }
    video.is_public
        && video.moderation_status == ModerationStatus::Approved.as_str()
        && video.status == GenerationStatus::Completed.as_str()
}

pub(crate) async fn insert_or_refund(
    state: &AppState,
    create: &CreateVideo,
) -> AppResult<GeneratedVideo> {
    match VideoRepo::create(&state.pool, create).await {
        Ok(video) => Ok(video),
        Err(e) => {
            credits::refund(state, create.user_id, UsageKind::Video, create.nuts_cost, None, None).await;
            Err(e.into())
        }
    }
}

pub(crate) async fn reload(state: &AppState, video: GeneratedVideo) -> AppResult<GeneratedVideo> {
    Ok(VideoRepo::find_by_id(&state.pool, video.id)
        .await?
        .unwrap_or(video))
}
