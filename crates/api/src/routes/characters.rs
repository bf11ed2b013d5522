//! Route definitions for companions and their conversations.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{characters, chat};
use crate::state::AppState;

/// Routes mounted at `/characters`.
///
/// ```text
/// GET    /                        -> list_characters
/// POST   /                        -> create_character
/// GET    /{id}                    -> get_character
/// PUT    /{id}                    -> update_character
/// DELETE /{id}                    -> delete_character
/// GET    /{id}/messages           -> list_messages (?limit, before_id)
/// POST   /{id}/messages           -> send_message
/// DELETE /{id}/messages           -> clear_messages
/// POST   /{id}/messages/stream    -> stream_message (SSE)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(characters::list_characters).post(characters::create_character),
        )
        .route(
            "/{id}",
            get(characters::get_character)
                .put(characters::update_character)
                .delete(characters::delete_character),
        )
        .route(
            "/{id}/messages",
            get(chat::list_messages)
                .post(chat::send_message)
                .delete(chat::clear_messages),
        )
        .route("/{id}/messages/stream", post(chat::stream_message))
}

/// Routes mounted at `/messages`.
///
/// ```text
/// POST /{id}/speech          -> synthesize_speech
/// POST /{id}/avatar-video    -> create_avatar_video
/// ```
pub fn messages_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/speech", post(chat::synthesize_speech))
        .route("/{id}/avatar-video", post(chat::create_avatar_video))
}
