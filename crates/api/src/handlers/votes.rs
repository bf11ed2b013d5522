//! Handlers for image votes.

use axum::extract::{Path, State};
use axum::Json;
use muse_core::types::DbId;
use muse_core::voting::VoteType;
use muse_db::models::vote::VoteTally;
use muse_db::repositories::VoteRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::images::{can_view, find_image};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub vote_type: String,
}

/// POST /api/v1/images/{id}/vote
///
/// Repeating the caller's current vote removes it; the opposite vote
/// switches it.
pub async fn cast_vote(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<DbId>,
    Json(input): Json<CastVoteRequest>,
) -> AppResult<Json<DataResponse<VoteTally>>> {
    let vote_type = VoteType::parse(&input.vote_type)?;

    let image = find_image(&state, image_id).await?;
    if !can_view(&image, Some(&auth_user)) {
        return Err(AppError::not_found("Image", image_id));
    }

    let tally = VoteRepo::cast(&state.pool, image_id, auth_user.user_id, vote_type)
        .await?
        .ok_or_else(|| AppError::not_found("Image", image_id))?;

    tracing::debug!(
        image_id,
        user_id = auth_user.user_id,
        vote = vote_type.as_str(),
        upvotes = tally.upvotes,
        downvotes = tally.downvotes,
        "Vote cast"
    );
    Ok(Json(DataResponse { data: tally }))
}

/// GET /api/v1/images/{id}/vote
pub async fn get_vote(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<DbId>,
) -> AppResult<Json<DataResponse<VoteTally>>> {
    let image = find_image(&state, image_id).await?;
    if !can_view(&image, Some(&auth_user)) {
        return Err(AppError::not_found("Image", image_id));
    }

    let tally = VoteRepo::tally(&state.pool, image_id, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Image", image_id))?;
    Ok(Json(DataResponse { data: tally }))
}
