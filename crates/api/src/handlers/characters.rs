//! Handlers for companions.
//!
//! Users create their own companions; system companions have no owner and
//! are created and edited by admins.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::roles::ROLE_ADMIN;
use muse_core::types::DbId;
use muse_core::validation::validate_input;
use muse_db::models::character::{Character, CreateCharacter, UpdateCharacter};
use muse_db::repositories::CharacterRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/characters
///
/// System companions first, then public and own ones.
pub async fn list_characters(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<Character>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let characters =
        CharacterRepo::list_visible(&state.pool, auth_user.user_id, limit, offset).await?;
    Ok(Json(DataResponse { data: characters }))
}

/// POST /api/v1/characters
pub async fn create_character(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<CreateCharacter>,
) -> AppResult<(StatusCode, Json<DataResponse<Character>>)> {
    validate_input(&input)?;
    let character = CharacterRepo::create(&state.pool, Some(auth_user.user_id), &input).await?;
    tracing::info!(character_id = character.id, owner_id = auth_user.user_id, "Companion created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: character })))
}

/// POST /api/v1/admin/characters
///
/// Create a system companion, visible to every user.
pub async fn create_system_character(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateCharacter>,
) -> AppResult<(StatusCode, Json<DataResponse<Character>>)> {
    validate_input(&input)?;
    let character = CharacterRepo::create(&state.pool, None, &input).await?;
    tracing::info!(character_id = character.id, admin_id = admin.user_id, "System companion created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: character })))
}

/// GET /api/v1/characters/{id}
pub async fn get_character(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Character>>> {
    let character = find_visible(&state, id, &auth_user).await?;
    Ok(Json(DataResponse { data: character }))
}

/// PUT /api/v1/characters/{id}
pub async fn update_character(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateCharacter>,
) -> AppResult<Json<DataResponse<Character>>> {
    validate_input(&input)?;
    let character = find_character(&state, id).await?;
    ensure_can_manage(&character, &auth_user)?;

    let character = CharacterRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Character", id))?;
    tracing::info!(character_id = id, user_id = auth_user.user_id, "Companion updated");
    Ok(Json(DataResponse { data: character }))
}

/// DELETE /api/v1/characters/{id}
///
/// Deletes the companion's chat history with every user.
pub async fn delete_character(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let character = find_character(&state, id).await?;
    ensure_can_manage(&character, &auth_user)?;

    if !CharacterRepo::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Character", id));
    }
    tracing::info!(character_id = id, user_id = auth_user.user_id, "Companion deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_character(state: &AppState, id: DbId) -> AppResult<Character> {
    CharacterRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Character", id))
}

/// Load a companion the caller may see. Hidden ones are reported missing.
pub(crate) async fn find_visible(
    state: &AppState,
    id: DbId,
    auth_user: &AuthUser,
) -> AppResult<Character> {
    let character = find_character(state, id).await?;
    if character.is_visible_to(auth_user.user_id) || auth_user.role == ROLE_ADMIN {
        Ok(character)
    } else {
        Err(AppError::not_found("Character", id))
    }
}

/// Owners manage their own companions; admins manage every companion.
fn ensure_can_manage(character: &Character, auth_user: &AuthUser) -> AppResult<()> {
    if auth_user.role == ROLE_ADMIN || character.owner_id == Some(auth_user.user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only change your own companions"))
    }
}
