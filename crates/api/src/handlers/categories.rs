//! Handlers for gallery categories. Writes are admin-only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::error::CoreError;
use muse_core::types::DbId;
use muse_core::validation::slugify;
use muse_db::models::category::{Category, CreateCategory, UpdateCategory};
use muse_db::repositories::CategoryRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Category>>>> {
    let categories = CategoryRepo::list_active(&state.pool).await?;
    Ok(Json(DataResponse { data: categories }))
}

/// POST /api/v1/admin/categories
///
/// The slug is derived from the name when omitted.
pub async fn create_category(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<DataResponse<Category>>)> {
    let name = input.name.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(CoreError::Validation("Name must be 1-64 characters".into()).into());
    }
    let slug = resolve_slug(input.slug.as_deref().unwrap_or(name))?;

    let category = CategoryRepo::create(
        &state.pool,
        name,
        &slug,
        input.description.as_deref(),
        input.sort_order,
    )
    .await?;

    tracing::info!(category_id = category.id, slug = %category.slug, admin_id = admin.user_id, "Category created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: category })))
}

/// PUT /api/v1/admin/categories/{id}
pub async fn update_category(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateCategory>,
) -> AppResult<Json<DataResponse<Category>>> {
    if let Some(name) = input.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() || name.chars().count() > 64 {
            return Err(CoreError::Validation("Name must be 1-64 characters".into()).into());
        }
    }
    if let Some(slug) = input.slug.as_mut() {
        *slug = resolve_slug(slug)?;
    }

    let category = CategoryRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Category", id))?;

    tracing::info!(category_id = id, admin_id = admin.user_id, "Category updated");
    Ok(Json(DataResponse { data: category }))
}

/// DELETE /api/v1/admin/categories/{id}
///
/// Images in the category keep existing with no category.
pub async fn delete_category(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !CategoryRepo::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Category", id));
    }
    tracing::info!(category_id = id, admin_id = admin.user_id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn resolve_slug(source: &str) -> AppResult<String> {
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(CoreError::Validation(
            "Slug must contain at least one letter or digit".into(),
        )
        .into());
    }
    Ok(slug)
}
