//! Route definitions for images, their votes and comments.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{comments, images, votes};
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// GET    /                  -> list_own
/// POST   /generate          -> generate
/// GET    /{id}              -> get_image
/// PATCH  /{id}              -> set_visibility
/// DELETE /{id}              -> delete_image
/// POST   /{id}/upscale      -> upscale
/// GET    /{id}/vote         -> get_vote
/// POST   /{id}/vote         -> cast_vote
/// GET    /{id}/comments     -> list_comments
/// POST   /{id}/comments     -> create_comment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list_own))
        .route("/generate", post(images::generate))
        .route(
            "/{id}",
            get(images::get_image)
                .patch(images::set_visibility)
                .delete(images::delete_image),
        )
        .route("/{id}/upscale", post(images::upscale))
        .route("/{id}/vote", get(votes::get_vote).post(votes::cast_vote))
        .route(
            "/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
}

/// Routes mounted at `/comments`.
///
/// ```text
/// DELETE /{id}    -> delete_comment (author or moderator)
/// ```
pub fn comments_router() -> Router<AppState> {
    Router::new().route("/{id}", axum::routing::delete(comments::delete_comment))
}
