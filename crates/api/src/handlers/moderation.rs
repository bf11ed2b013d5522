//! Moderation queue handlers. Moderators and admins only.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::moderation::{ModerationAction, ModerationStatus};
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::types::DbId;
use muse_db::models::image::GeneratedImage;
use muse_db::models::video::GeneratedVideo;
use muse_db::repositories::{CommentRepo, ImageRepo, VideoRepo};
use muse_events::{event_types, PlatformEvent};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::images::find_image;
use crate::handlers::videos::find_video;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireModerator;
use crate::query::ModerationQueueParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub action: ModerationAction,
    pub note: Option<String>,
}

/// GET /api/v1/admin/moderation/images?status=pending
pub async fn image_queue(
    RequireModerator(_moderator): RequireModerator,
    State(state): State<AppState>,
    Query(params): Query<ModerationQueueParams>,
) -> AppResult<Json<PageResponse<GeneratedImage>>> {
    let status = queue_status(params.status.as_deref())?;
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);

    let data = ImageRepo::moderation_queue(&state.pool, status.as_str(), limit, offset).await?;
    let total = ImageRepo::count_by_moderation_status(&state.pool, status.as_str()).await?;
    Ok(Json(PageResponse {
        data,
        total,
        limit,
        offset,
    }))
}

/// GET /api/v1/admin/moderation/videos?status=pending
pub async fn video_queue(
    RequireModerator(_moderator): RequireModerator,
    State(state): State<AppState>,
    Query(params): Query<ModerationQueueParams>,
) -> AppResult<Json<PageResponse<GeneratedVideo>>> {
    let status = queue_status(params.status.as_deref())?;
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);

    let data = VideoRepo::moderation_queue(&state.pool, status.as_str(), limit, offset).await?;
    let total = VideoRepo::count_by_moderation_status(&state.pool, status.as_str()).await?;
    Ok(Json(PageResponse {
        data,
        total,
        limit,
        offset,
    }))
}

/// POST /api/v1/admin/moderation/images/{id}
pub async fn moderate_image(
    RequireModerator(moderator): RequireModerator,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ModerateRequest>,
) -> AppResult<Json<DataResponse<GeneratedImage>>> {
    let image = find_image(&state, id).await?;
    if !image.is_public {
        return Err(AppError::BadRequest(
            "Only published media can be moderated".into(),
        ));
    }

    let status = input.action.resulting_status();
    let note = clean_note(input.note.as_deref());
    let image = ImageRepo::moderate(&state.pool, id, status.as_str(), note, moderator.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Image", id))?;

    publish_moderated(&state, &moderator, "image", id, image.user_id, status);
    Ok(Json(DataResponse { data: image }))
}

/// POST /api/v1/admin/moderation/videos/{id}
pub async fn moderate_video(
    RequireModerator(moderator): RequireModerator,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ModerateRequest>,
) -> AppResult<Json<DataResponse<GeneratedVideo>>> {
    let video = find_video(&state, id).await?;
    if !video.is_public {
        return Err(AppError::BadRequest(
            "Only published media can be moderated".into(),
        ));
    }

    let status = input.action.resulting_status();
    let note = clean_note(input.note.as_deref());
    let video = VideoRepo::moderate(&state.pool, id, status.as_str(), note, moderator.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Video", id))?;

    publish_moderated(&state, &moderator, "video", id, video.user_id, status);
    Ok(Json(DataResponse { data: video }))
}

/// DELETE /api/v1/admin/comments/{id}
pub async fn delete_comment(
    RequireModerator(moderator): RequireModerator,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !CommentRepo::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Comment", id));
    }
    tracing::info!(comment_id = id, moderator_id = moderator.user_id, "Comment removed by moderator");
    Ok(StatusCode::NO_CONTENT)
}

/// Queue filter; defaults to `pending`. `private` media is never queued.
fn queue_status(raw: Option<&str>) -> AppResult<ModerationStatus> {
    let status = ModerationStatus::parse(raw.unwrap_or("pending"))?;
    if status == ModerationStatus::Private {
        return Err(AppError::BadRequest(
            "Private media is not part of the moderation queue".into(),
        ));
    }
    Ok(status)
}

fn clean_note(note: Option<&str>) -> Option<&str> {
    note.map(str::trim).filter(|n| !n.is_empty())
}

fn publish_moderated(
    state: &AppState,
    moderator: &AuthUser,
    entity_type: &'static str,
    id: DbId,
    owner_id: DbId,
    status: ModerationStatus,
) {
    tracing::info!(
        entity_type,
        id,
        moderator_id = moderator.user_id,
        status = status.as_str(),
        "Content moderated"
    );
    state.event_bus.publish(
        PlatformEvent::new(event_types::CONTENT_MODERATED)
            .with_source(entity_type, id)
            .with_actor(moderator.user_id)
            .with_payload(serde_json::json!({
                "status": status.as_str(),
                "owner_id": owner_id,
            })),
    );
}
