pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod characters;
pub mod gallery;
pub mod health;
pub mod images;
pub mod videos;
pub mod webhooks;

use axum::routing::get;
use axum::Router;

use crate::handlers::categories;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth
///     /register, /login, /refresh, /logout                   session lifecycle
///     /verify-email, /verify-email/resend                    email verification
///     /password-reset, /password-reset/confirm               password reset
///
/// /me                                                        own account, nuts, sessions
///
/// /images                                                    own images
///     /generate                                              txt2img (POST)
///     /{id}                                                  get, publish, delete
///     /{id}/upscale                                          upscale (POST)
///     /{id}/vote                                             tally, cast
///     /{id}/comments                                         list, create
///
/// /comments/{id}                                             delete own comment
///
/// /videos                                                    own videos
///     /generate                                              img2video (POST)
///     /{id}                                                  get, publish, delete
///
/// /gallery
///     /images, /videos                                       public approved media
///
/// /categories                                                active categories (public)
///
/// /characters                                                companions
///     /{id}/messages                                         history, send, clear
///     /{id}/messages/stream                                  streamed reply (SSE)
///
/// /messages/{id}
///     /speech, /avatar-video                                 voice and talking avatar
///
/// /plans                                                     active plans (public)
/// /subscriptions
///     /checkout, /current, /cancel
///
/// /webhooks
///     /gpu, /stripe, /paypal                                 signed callbacks
///
/// /admin                                                     moderation and administration
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Registration, login, tokens, verification, password reset.
        .nest("/auth", auth::router())
        // The caller's own account.
        .nest("/me", account::router())
        // Image generation, votes and comments.
        .nest("/images", images::router())
        .nest("/comments", images::comments_router())
        // Video generation.
        .nest("/videos", videos::router())
        // Public gallery.
        .nest("/gallery", gallery::router())
        // Public category list; management lives under /admin.
        .route("/categories", get(categories::list_categories))
        // Companions and chat.
        .nest("/characters", characters::router())
        .nest("/messages", characters::messages_router())
        // Plans and subscriptions.
        .nest("/plans", billing::plans_router())
        .nest("/subscriptions", billing::subscriptions_router())
        // GPU and payment provider callbacks.
        .nest("/webhooks", webhooks::router())
        // Moderation queue, users, plans, stats.
        .nest("/admin", admin::router())
}
