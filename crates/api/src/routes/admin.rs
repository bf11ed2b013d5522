//! Route definitions for the `/admin` resource.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::{admin, categories, characters, moderation};
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// Moderator or admin:
///
/// ```text
/// GET    /moderation/images         -> image_queue (?status, limit, offset)
/// POST   /moderation/images/{id}    -> moderate_image
/// GET    /moderation/videos         -> video_queue
/// POST   /moderation/videos/{id}    -> moderate_video
/// DELETE /comments/{id}             -> delete_comment
/// ```
///
/// Admin only:
///
/// ```text
/// GET    /users                     -> list_users (?q, limit, offset)
/// GET    /users/{id}                -> get_user
/// PUT    /users/{id}                -> update_user
/// POST   /users/{id}/nuts           -> adjust_nuts
/// POST   /users/{id}/subscription   -> grant_subscription
/// GET    /plans                     -> list_plans
/// POST   /plans                     -> create_plan
/// PUT    /plans/{id}                -> update_plan
/// POST   /categories                -> create_category
/// PUT    /categories/{id}           -> update_category
/// DELETE /categories/{id}           -> delete_category
/// POST   /characters                -> create_system_character
/// GET    /stats                     -> get_stats
/// GET    /events                    -> list_events (?limit, offset)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/moderation/images", get(moderation::image_queue))
        .route("/moderation/images/{id}", post(moderation::moderate_image))
        .route("/moderation/videos", get(moderation::video_queue))
        .route("/moderation/videos/{id}", post(moderation::moderate_video))
        .route("/comments/{id}", delete(moderation::delete_comment))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", get(admin::get_user).put(admin::update_user))
        .route("/users/{id}/nuts", post(admin::adjust_nuts))
        .route("/users/{id}/subscription", post(admin::grant_subscription))
        .route("/plans", get(admin::list_plans).post(admin::create_plan))
        .route("/plans/{id}", put(admin::update_plan))
        .route("/categories", post(categories::create_category))
        .route(
            "/categories/{id}",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route("/characters", post(characters::create_system_character))
        .route("/stats", get(admin::get_stats))
        .route("/events", get(admin::list_events))
}
