//! Route definitions for the `/videos` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::videos;
use crate::state::AppState;

/// Routes mounted at `/videos`.
///
/// ```text
/// GET    /            -> list_own
/// POST   /generate    -> generate
/// GET    /{id}        -> get_video
/// PATCH  /{id}        -> set_visibility
/// DELETE /{id}        -> delete_video
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(videos::list_own))
        .route("/generate", post(videos::generate))
        .route(
            "/{id}",
            get(videos::get_video)
                .patch(videos::set_visibility)
                .delete(videos::delete_video),
        )
}
