//! Handlers for image comments.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::types::DbId;
use muse_core::validation::validate_input;
use muse_db::models::comment::{CommentWithAuthor, ImageComment};
use muse_db::repositories::CommentRepo;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::images::{can_view, find_image};
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 1000, message = "Comment must be 1-1000 characters"))]
    pub body: String,
}

/// GET /api/v1/images/{id}/comments
///
/// Oldest first, with each author's username.
pub async fn list_comments(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(image_id): Path<DbId>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<CommentWithAuthor>>>> {
    let image = find_image(&state, image_id).await?;
    if !can_view(&image, viewer.as_ref()) {
        return Err(AppError::not_found("Image", image_id));
    }

    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let comments = CommentRepo::list_for_image(&state.pool, image_id, limit, offset).await?;
    Ok(Json(DataResponse { data: comments }))
}

/// POST /api/v1/images/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<DbId>,
    Json(mut input): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ImageComment>>)> {
    input.body = input.body.trim().to_string();
    validate_input(&input)?;

    let image = find_image(&state, image_id).await?;
    if !can_view(&image, Some(&auth_user)) {
        return Err(AppError::not_found("Image", image_id));
    }

    let comment = CommentRepo::create(&state.pool, image_id, auth_user.user_id, &input.body).await?;
    tracing::debug!(image_id, comment_id = comment.id, user_id = auth_user.user_id, "Comment added");
    Ok((StatusCode::CREATED, Json(DataResponse { data: comment })))
}

/// DELETE /api/v1/comments/{id}
///
/// The author or a moderator. Moderators also have
/// `DELETE /api/v1/admin/comments/{id}`.
pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let comment = CommentRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment", id))?;
    if !auth_user.owns_or_moderates(comment.user_id) {
        return Err(AppError::forbidden("You can only delete your own comments"));
    }

    if !CommentRepo::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Comment", id));
    }
    tracing::info!(comment_id = id, image_id = comment.image_id, deleted_by = auth_user.user_id, "Comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
