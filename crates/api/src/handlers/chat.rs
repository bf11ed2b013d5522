//! Companion chat: conversation history, plain and streamed replies, and
//! voice/video renditions of assistant messages.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use muse_core::credits::{reasons, UsageKind};
use muse_core::generation::VIDEO_KIND_TALKING_AVATAR;
use muse_core::pagination::{clamp_limit, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::prompt::{build_chat_context, build_persona_prompt, ChatRole, ChatTurn, Persona};
use muse_core::types::DbId;
use muse_db::models::character::Character;
use muse_db::models::chat_message::{ChatMessage, MessagePageQuery};
use muse_db::models::nut_transaction::LedgerRef;
use muse_db::models::video::{CreateVideo, GeneratedVideo};
use muse_db::repositories::{CharacterRepo, ChatMessageRepo, UserRepo};
use muse_providers::{GpuInput, ProviderError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::engine::credits;
use crate::engine::jobs::{self, JobRow};
use crate::error::{AppError, AppResult};
use crate::handlers::characters::find_visible;
use crate::handlers::videos::{find_video, insert_or_refund, reload};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Longest accepted user message, in characters.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Buffered SSE events per streaming reply.
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// The stored user message and the companion's reply.
#[derive(Debug, Serialize)]
pub struct Exchange {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct TokenDelta<'a> {
    delta: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamError {
    error: String,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// GET /api/v1/characters/{id}/messages
///
/// The newest page (before `before_id` when given), oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(character_id): Path<DbId>,
    Query(params): Query<MessagePageQuery>,
) -> AppResult<Json<DataResponse<Vec<ChatMessage>>>> {
    find_visible(&state, character_id, &auth_user).await?;
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);

    let messages = ChatMessageRepo::page(
        &state.pool,
        auth_user.user_id,
        character_id,
        limit,
        params.before_id,
    )
    .await?;
    Ok(Json(DataResponse { data: messages }))
}

/// POST /api/v1/characters/{id}/messages
///
/// Ask the companion for a reply. Both messages are stored only once the
/// reply has arrived.
pub async fn send_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(character_id): Path<DbId>,
    Json(input): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Exchange>>)> {
    let content = validate_content(&input.content)?;
    let character = find_visible(&state, character_id, &auth_user).await?;
    count_message(&state, auth_user.user_id).await?;

    let turns = match conversation_turns(&state, &auth_user, &character, &content).await {
        Ok(turns) => turns,
        Err(e) => {
            release_message(&state, auth_user.user_id).await;
            return Err(e);
        }
    };

    let reply = match state.llm.chat(&turns).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => {
            release_message(&state, auth_user.user_id).await;
            return Err(AppError::Provider(ProviderError::InvalidResponse(
                "Empty reply from the language model".into(),
            )));
        }
        Err(e) => {
            release_message(&state, auth_user.user_id).await;
            return Err(e.into());
        }
    };

    let (user_message, assistant_message) = ChatMessageRepo::create_exchange(
        &state.pool,
        auth_user.user_id,
        character_id,
        &content,
        &reply,
    )
    .await?;

    tracing::debug!(
        user_id = auth_user.user_id,
        character_id,
        message_id = assistant_message.id,
        "Chat reply stored"
    );
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: Exchange {
                user_message,
                assistant_message,
            },
        }),
    ))
}

/// POST /api/v1/characters/{id}/messages/stream
///
/// Server-sent events:
///
/// ```text
/// event: message   the stored user message
/// event: token     {"delta": "..."} per upstream chunk
/// event: done      the stored assistant message
/// event: error     {"error": "..."}
/// ```
///
/// The assistant message is stored only when the upstream stream finishes
/// cleanly with non-empty text. A failed or empty upstream reply releases the
/// daily message slot.
pub async fn stream_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(character_id): Path<DbId>,
    Json(input): Json<SendMessageRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let content = validate_content(&input.content)?;
    let character = find_visible(&state, character_id, &auth_user).await?;
    count_message(&state, auth_user.user_id).await?;

    let upstream = match conversation_turns(&state, &auth_user, &character, &content).await {
        Ok(turns) => state.llm.chat_stream(&turns).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    let mut upstream = match upstream {
        Ok(stream) => stream,
        Err(e) => {
            release_message(&state, auth_user.user_id).await;
            return Err(e);
        }
    };

    let user_message = ChatMessageRepo::create(
        &state.pool,
        auth_user.user_id,
        character_id,
        ChatRole::User.as_str(),
        &content,
    )
    .await?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);
    let user_id = auth_user.user_id;
    tokio::spawn(async move {
        if tx.send(Ok(json_event("message", &user_message))).await.is_err() {
            return;
        }

        let mut reply = String::new();
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(delta) => {
                    reply.push_str(&delta);
                    let event = json_event("token", &TokenDelta { delta: &delta });
                    if tx.send(Ok(event)).await.is_err() {
                        tracing::debug!(user_id, character_id, "Chat stream closed by client");
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(user_id, character_id, error = %e, "Chat stream failed");
                    release_message(&state, user_id).await;
                    let _ = tx
                        .send(Ok(json_event("error", &StreamError { error: e.to_string() })))
                        .await;
                    return;
                }
            }
        }

        let reply = reply.trim();
        if reply.is_empty() {
            let error = StreamError {
                error: "Empty reply from the language model".into(),
            };
            release_message(&state, user_id).await;
            let _ = tx.send(Ok(json_event("error", &error))).await;
            return;
        }

        match ChatMessageRepo::create(
            &state.pool,
            user_id,
            character_id,
            ChatRole::Assistant.as_str(),
            reply,
        )
        .await
        {
            Ok(assistant_message) => {
                let _ = tx.send(Ok(json_event("done", &assistant_message))).await;
            }
            Err(e) => {
                tracing::error!(user_id, character_id, error = %e, "Failed to store streamed reply");
                let error = StreamError {
                    error: "Failed to store reply".into(),
                };
                let _ = tx.send(Ok(json_event("error", &error))).await;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// DELETE /api/v1/characters/{id}/messages
pub async fn clear_messages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(character_id): Path<DbId>,
) -> AppResult<StatusCode> {
    find_visible(&state, character_id, &auth_user).await?;
    let deleted = ChatMessageRepo::clear(&state.pool, auth_user.user_id, character_id).await?;
    tracing::info!(user_id = auth_user.user_id, character_id, deleted, "Chat history cleared");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Speech and avatar video
// ---------------------------------------------------------------------------

/// POST /api/v1/messages/{id}/speech
///
/// Voice an assistant message. Already voiced messages are returned as they
/// are, without charging.
pub async fn synthesize_speech(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ChatMessage>>> {
    let message = find_assistant_message(&state, message_id, &auth_user).await?;
    if message.audio_url.is_some() {
        return Ok(Json(DataResponse { data: message }));
    }

    let character = CharacterRepo::find_by_id(&state.pool, message.character_id)
        .await?
        .ok_or_else(|| AppError::not_found("Character", message.character_id))?;
    let message = voice_message(&state, &message, &character).await?;
    Ok(Json(DataResponse { data: message }))
}

/// POST /api/v1/messages/{id}/avatar-video
///
/// Render the companion's avatar speaking an assistant message. The message
/// is voiced first when needed. A message that already has a video returns
/// that video.
pub async fn create_avatar_video(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(message_id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedVideo>>)> {
    let message = find_assistant_message(&state, message_id, &auth_user).await?;
    if let Some(video_id) = message.video_id {
        let video = find_video(&state, video_id).await?;
        return Ok((StatusCode::OK, Json(DataResponse { data: video })));
    }

    let character = CharacterRepo::find_by_id(&state.pool, message.character_id)
        .await?
        .ok_or_else(|| AppError::not_found("Character", message.character_id))?;
    let Some(avatar_url) = character.avatar_url.clone() else {
        return Err(AppError::BadRequest(
            "This companion has no avatar to animate".into(),
        ));
    };

    let message = if message.audio_url.is_some() {
        message
    } else {
        voice_message(&state, &message, &character).await?
    };
    let audio_url = message
        .audio_url
        .clone()
        .ok_or_else(|| AppError::InternalError("Voiced message has no audio URL".into()))?;

    let cost = state.config.credits.costs.avatar_video;
    credits::charge(
        &state,
        auth_user.user_id,
        UsageKind::Video,
        cost,
        reasons::AVATAR_VIDEO,
    )
    .await?;

    let create = CreateVideo {
        user_id: auth_user.user_id,
        source_image_id: None,
        character_id: Some(character.id),
        kind: VIDEO_KIND_TALKING_AVATAR.to_string(),
        prompt: None,
        audio_url: Some(audio_url.clone()),
        duration_secs: None,
        nuts_cost: cost,
        is_public: false,
    };
    let video = insert_or_refund(&state, &create).await?;
    ChatMessageRepo::set_video_id(&state.pool, message.id, video.id).await?;

    let job = JobRow::from_video(&video);
    jobs::submit(
        &state,
        &job,
        &GpuInput::TalkingAvatar {
            image_url: avatar_url,
            audio_url,
        },
    )
    .await?;

    let video = reload(&state, video).await?;
    tracing::info!(
        user_id = auth_user.user_id,
        message_id = message.id,
        video_id = video.id,
        "Avatar video queued"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: video })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_content(content: &str) -> AppResult<String> {
    let content = content.trim();
    let len = content.chars().count();
    if len == 0 || len > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "Message must be 1-{MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content.to_string())
}

/// Count a message against today's limit. Messages cost no nuts.
async fn count_message(state: &AppState, user_id: DbId) -> AppResult<()> {
    credits::charge(state, user_id, UsageKind::Message, 0, reasons::CHAT_MESSAGE).await?;
    Ok(())
}

async fn release_message(state: &AppState, user_id: DbId) {
    credits::refund(state, user_id, UsageKind::Message, 0, None, None).await;
}

/// System prompt, greeting, recent history and the new message.
async fn conversation_turns(
    state: &AppState,
    auth_user: &AuthUser,
    character: &Character,
    content: &str,
) -> AppResult<Vec<ChatTurn>> {
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    let max_history = state.config.chat_context_messages;
    let history: Vec<ChatTurn> = ChatMessageRepo::page(
        &state.pool,
        auth_user.user_id,
        character.id,
        max_history as i64,
        None,
    )
    .await?
    .iter()
    .map(ChatMessage::to_turn)
    .collect();

    let system_prompt = build_persona_prompt(
        Persona {
            name: &character.name,
            personality: character.personality.as_deref(),
            appearance: character.appearance.as_deref(),
            scenario: character.scenario.as_deref(),
        },
        &user.username,
    );
    Ok(build_chat_context(
        &system_prompt,
        character.greeting.as_deref(),
        &history,
        content,
        max_history,
    ))
}

/// An assistant message owned by the caller. Anything else is reported
/// missing, except the caller's own user messages which are rejected.
async fn find_assistant_message(
    state: &AppState,
    id: DbId,
    auth_user: &AuthUser,
) -> AppResult<ChatMessage> {
    let message = ChatMessageRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|m| m.user_id == auth_user.user_id)
        .ok_or_else(|| AppError::not_found("Message", id))?;
    if message.role != ChatRole::Assistant.as_str() {
        return Err(AppError::BadRequest(
            "Only companion messages can be voiced".into(),
        ));
    }
    Ok(message)
}

/// Charge for speech, synthesize with the companion's voice, upload, and
/// store the audio URL. Failures after the charge are refunded.
async fn voice_message(
    state: &AppState,
    message: &ChatMessage,
    character: &Character,
) -> AppResult<ChatMessage> {
    let cost = state.config.credits.costs.speech;
    credits::charge(state, message.user_id, UsageKind::Speech, cost, reasons::SPEECH).await?;

    match synthesize_and_store(state, message, character).await {
        Ok(voiced) => {
            tracing::info!(message_id = message.id, user_id = message.user_id, "Message voiced");
            Ok(voiced)
        }
        Err(e) => {
            credits::refund(
                state,
                message.user_id,
                UsageKind::Speech,
                cost,
                None,
                Some(LedgerRef {
                    entity_type: "chat_message",
                    entity_id: message.id,
                }),
            )
            .await;
            Err(e)
        }
    }
}

async fn synthesize_and_store(
    state: &AppState,
    message: &ChatMessage,
    character: &Character,
) -> AppResult<ChatMessage> {
    let audio = state
        .speech
        .synthesize(&message.content, character.voice_id.as_deref())
        .await?;
    let path = format!("audio/{}/{}.mp3", message.user_id, message.id);
    let url = state.storage.upload(&path, audio, "audio/mpeg").await?;

    ChatMessageRepo::set_audio_url(&state.pool, message.id, &url)
        .await?
        .ok_or_else(|| AppError::not_found("Message", message.id))
}

/// An SSE event with a JSON body.
fn json_event<T: Serialize>(name: &'static str, data: &T) -> Event {
    Event::default().event(name).json_data(data).unwrap_or_else(|e| {
        tracing::error!(event = name, error = %e, "Failed to encode SSE event");
        Event::default().event("error").data(r#"{"error":"Encoding failed"}"#)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(validate_content("  hi there ").unwrap(), "hi there");
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }
}
