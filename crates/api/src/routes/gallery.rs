//! Route definitions for the public gallery.

use axum::routing::get;
use axum::Router;

use crate::handlers::{images, videos};
use crate::state::AppState;

/// Routes mounted at `/gallery`. No authentication.
///
/// ```text
/// GET /images    -> images::gallery (?category_id, character_id, sort, limit, offset)
/// GET /videos    -> videos::gallery (?character_id, limit, offset)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/images", get(images::gallery))
        .route("/videos", get(videos::gallery))
}
