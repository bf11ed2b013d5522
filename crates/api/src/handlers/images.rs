//! Handlers for `/images`: generation, upscaling, listing, publication and
//! deletion, plus the public image gallery.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::credits::{reasons, UsageKind};
use muse_core::generation::{
    upscaled_size, validate_dimensions, validate_upscale_factor, GenerationStatus, DEFAULT_HEIGHT,
    DEFAULT_WIDTH, IMAGE_KIND_GENERATION, IMAGE_KIND_UPSCALE,
};
use muse_core::moderation::{status_after_visibility_change, ModerationStatus};
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::prompt::{build_image_prompt, ImagePromptParts};
use muse_core::types::DbId;
use muse_core::validation::validate_input;
use muse_db::models::image::{
    CreateImage, GalleryImage, GalleryQuery, GallerySort, GeneratedImage, ImageListQuery,
};
use muse_db::repositories::{CategoryRepo, CharacterRepo, ImageRepo};
use muse_providers::GpuInput;
use serde::Deserialize;
use validator::Validate;

use crate::engine::credits;
use crate::engine::jobs::{self, JobRow};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthUser, MaybeAuthUser};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateImageRequest {
    #[validate(length(min = 1, max = 1000, message = "Prompt must be 1-1000 characters"))]
    pub prompt: String,
    #[validate(length(max = 1000, message = "Negative prompt must be at most 1000 characters"))]
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub category_id: Option<DbId>,
    pub character_id: Option<DbId>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub seed: Option<i64>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpscaleRequest {
    pub scale: i32,
}

/// Body of `PATCH /images/{id}` and `PATCH /videos/{id}`.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub is_public: bool,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// POST /api/v1/images/generate
///
/// Charge the caller, store a pending image, and queue it on the txt2img
/// endpoint. The image completes through the GPU webhook.
pub async fn generate(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<GenerateImageRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedImage>>)> {
    validate_input(&input)?;
    let width = input.width.unwrap_or(DEFAULT_WIDTH);
    let height = input.height.unwrap_or(DEFAULT_HEIGHT);
    validate_dimensions(width, height)?;

    let character = match input.character_id {
        Some(id) => Some(
            CharacterRepo::find_by_id(&state.pool, id)
                .await?
                .filter(|c| c.is_visible_to(auth_user.user_id))
                .ok_or_else(|| AppError::not_found("Character", id))?,
        ),
        None => None,
    };
    let category = match input.category_id {
        Some(id) => Some(
            CategoryRepo::find_by_id(&state.pool, id)
                .await?
                .filter(|c| c.is_active)
                .ok_or_else(|| AppError::not_found("Category", id))?,
        ),
        None => None,
    };

    let built = build_image_prompt(ImagePromptParts {
        prompt: &input.prompt,
        negative_prompt: input.negative_prompt.as_deref(),
        style: input.style.as_deref(),
        character_appearance: character.as_ref().and_then(|c| c.appearance.as_deref()),
        category: category.as_ref().map(|c| c.name.as_str()),
    })?;

    let cost = state.config.credits.costs.image;
    credits::charge(
        &state,
        auth_user.user_id,
        UsageKind::Image,
        cost,
        reasons::IMAGE_GENERATION,
    )
    .await?;

    let create = CreateImage {
        user_id: auth_user.user_id,
        category_id: input.category_id,
        character_id: input.character_id,
        parent_image_id: None,
        kind: IMAGE_KIND_GENERATION.to_string(),
        prompt: input.prompt.trim().to_string(),
        negative_prompt: input.negative_prompt.clone(),
        full_prompt: built.positive.clone(),
        style: input.style.clone(),
        width,
        height,
        seed: input.seed,
        nuts_cost: cost,
        is_public: input.is_public.unwrap_or(false),
    };
    let image = insert_or_refund(&state, &create).await?;

    let job = JobRow::from_image(&image);
    jobs::submit(
        &state,
        &job,
        &GpuInput::Txt2Img {
            prompt: built.positive,
            negative_prompt: built.negative,
            width,
            height,
            seed: input.seed,
        },
    )
    .await?;

    let image = reload(&state, image).await?;
    tracing::info!(user_id = auth_user.user_id, image_id = image.id, "Image generation queued");
    Ok((StatusCode::CREATED, Json(DataResponse { data: image })))
}

/// POST /api/v1/images/{id}/upscale
///
/// Upscale one of the caller's completed images into a new child image.
pub async fn upscale(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpscaleRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedImage>>)> {
    validate_upscale_factor(input.scale)?;

    let source = find_image(&state, id).await?;
    if source.user_id != auth_user.user_id {
        return Err(AppError::forbidden("You can only upscale your own images"));
    }
    let source_url = match (source.status.as_str(), source.image_url.as_deref()) {
        ("completed", Some(url)) => url.to_string(),
        _ => {
            return Err(AppError::BadRequest(
                "Only completed images can be upscaled".into(),
            ))
        }
    };
    let (width, height) = upscaled_size(source.width, source.height, input.scale)?;

    let cost = state.config.credits.costs.upscale;
    credits::charge(
        &state,
        auth_user.user_id,
        UsageKind::Image,
        cost,
        reasons::IMAGE_UPSCALE,
    )
    .await?;

    let create = CreateImage {
        user_id: auth_user.user_id,
        category_id: source.category_id,
        character_id: source.character_id,
        parent_image_id: Some(source.id),
        kind: IMAGE_KIND_UPSCALE.to_string(),
        prompt: source.prompt.clone(),
        negative_prompt: source.negative_prompt.clone(),
        full_prompt: source.full_prompt.clone(),
        style: source.style.clone(),
        width,
        height,
        seed: source.seed,
        nuts_cost: cost,
        is_public: false,
    };
    let image = insert_or_refund(&state, &create).await?;

    let job = JobRow::from_image(&image);
    jobs::submit(
        &state,
        &job,
        &GpuInput::Upscale {
            image_url: source_url,
            scale: input.scale,
        },
    )
    .await?;

    let image = reload(&state, image).await?;
    tracing::info!(
        user_id = auth_user.user_id,
        image_id = image.id,
        parent_image_id = source.id,
        scale = input.scale,
        "Image upscale queued"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: image })))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/images
///
/// The caller's own images, newest first, optionally filtered by status.
pub async fn list_own(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<ImageListQuery>,
) -> AppResult<Json<DataResponse<Vec<GeneratedImage>>>> {
    if let Some(status) = params.status.as_deref() {
        GenerationStatus::parse(status)?;
    }
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);

    let images = ImageRepo::list_for_user(
        &state.pool,
        auth_user.user_id,
        params.status.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: images }))
}

/// GET /api/v1/images/{id}
///
/// Visible to the owner and to staff; to everyone else only once published
/// and approved.
pub async fn get_image(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<GeneratedImage>>> {
    let image = find_image(&state, id).await?;
    if !can_view(&image, viewer.as_ref()) {
        return Err(AppError::not_found("Image", id));
    }
    Ok(Json(DataResponse { data: image }))
}

/// GET /api/v1/gallery/images
pub async fn gallery(
    State(state): State<AppState>,
    Query(params): Query<GalleryQuery>,
) -> AppResult<Json<DataResponse<Vec<GalleryImage>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let images = ImageRepo::gallery(
        &state.pool,
        params.category_id,
        params.character_id,
        GallerySort::parse(params.sort.as_deref()),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: images }))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// PATCH /api/v1/images/{id}
///
/// Publish or un-publish. Publishing sends the image to moderation.
pub async fn set_visibility(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<VisibilityRequest>,
) -> AppResult<Json<DataResponse<GeneratedImage>>> {
    let image = find_image(&state, id).await?;
    if image.user_id != auth_user.user_id {
        return Err(AppError::forbidden("You can only change your own images"));
    }

    let current = ModerationStatus::parse(&image.moderation_status)?;
    let next = status_after_visibility_change(current, input.is_public);
    let image = ImageRepo::set_visibility(&state.pool, id, input.is_public, next.as_str())
        .await?
        .ok_or_else(|| AppError::not_found("Image", id))?;

    tracing::info!(image_id = id, is_public = input.is_public, moderation = next.as_str(), "Image visibility changed");
    Ok(Json(DataResponse { data: image }))
}

/// DELETE /api/v1/images/{id}
///
/// Owner or moderator. The CDN copy is removed best-effort.
pub async fn delete_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let image = find_image(&state, id).await?;
    if !auth_user.owns_or_moderates(image.user_id) {
        return Err(AppError::forbidden("You can only delete your own images"));
    }

    let deleted = ImageRepo::delete(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Image", id))?;

    if let Some(path) = deleted.cdn_path.as_deref() {
        if let Err(e) = state.storage.delete(path).await {
            tracing::warn!(image_id = id, path, error = %e, "Failed to delete image from storage");
        }
    }
    tracing::info!(image_id = id, deleted_by = auth_user.user_id, "Image deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn find_image(state: &AppState, id: DbId) -> AppResult<GeneratedImage> {
    ImageRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Image", id))
}

/// Owner, staff, or a published, approved, completed image.
pub(crate) fn can_view(image: &GeneratedImage, viewer: Option<&AuthUser>) -> bool {
    if viewer.is_some_and(|v| v.owns_or_moderates(image.user_id)) {
        return true;
    }
    image.is_public
        && image.moderation_status == ModerationStatus::Approved.as_str()
        && image.status == GenerationStatus::Completed.as_str()
}

/// Insert the pending row; on failure give the charge back.
async fn insert_or_refund(state: &AppState, create: &CreateImage) -> AppResult<GeneratedImage> {
    match ImageRepo::create(&state.pool, create).await {
        Ok(image) => Ok(image),
        Err(e) => {
            credits::refund(state, create.user_id, UsageKind::Image, create.nuts_cost, None, None).await;
            Err(e.into())
        }
    }
}

/// Re-read after submission, which may already have changed the row.
async fn reload(state: &AppState, image: GeneratedImage) -> AppResult<GeneratedImage> {
    Ok(ImageRepo::find_by_id(&state.pool, image.id)
        .await?
        .unwrap_or(image))
}
