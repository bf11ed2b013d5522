//! Admin-only handlers: users, nuts, manual subscriptions, plans, platform
//! statistics and the event log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::billing::{PaymentProviderKind, PlanInterval};
use muse_core::credits::reasons;
use muse_core::error::CoreError;
use muse_core::moderation::ModerationStatus;
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::types::DbId;
use muse_db::models::event::Event;
use muse_db::models::plan::{CreatePlan, Plan, UpdatePlan};
use muse_db::models::subscription::Subscription;
use muse_db::models::user::UserWithRole;
use muse_db::repositories::{
    CreditRepo, EventRepo, ImageRepo, PlanRepo, RoleRepo, SessionRepo, SubscriptionRepo,
    UserRepo, VideoRepo,
};
use muse_events::{event_types, PlatformEvent};
use serde::{Deserialize, Serialize};

use crate::engine::subscriptions;
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::query::{PaginationParams, UserSearchParams};
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

/// Longest manual grant, in months.
const MAX_GRANT_MONTHS: u32 = 24;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUser {
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustNutsRequest {
    /// Positive to credit, negative to debit.
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct NutsBalance {
    pub user_id: DbId,
    pub nuts: i64,
}

#[derive(Debug, Deserialize)]
pub struct GrantSubscriptionRequest {
    pub plan_id: DbId,
    pub months: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub users: i64,
    pub images: i64,
    pub videos: i64,
    pub active_subscriptions: i64,
    pub pending_images: i64,
    pub pending_videos: i64,
    pub nuts_spent_today: i64,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/users?q=&limit=&offset=
pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<UserSearchParams>,
) -> AppResult<Json<PageResponse<UserWithRole>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let q = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let data = UserRepo::search(&state.pool, q, limit, offset).await?;
    let total = UserRepo::count(&state.pool).await?;
    Ok(Json(PageResponse {
        data,
        total,
        limit,
        offset,
    }))
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<UserWithRole>>> {
    let user = find_user(&state, id).await?;
    Ok(Json(DataResponse { data: user }))
}

/// PUT /api/v1/admin/users/{id}
///
/// Change a user's role and/or active flag. Deactivating a user revokes
/// all of their sessions. Admins cannot demote or deactivate themselves.
pub async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AdminUpdateUser>,
) -> AppResult<Json<DataResponse<UserWithRole>>> {
    find_user(&state, id).await?;
    if id == admin.user_id && (input.role.is_some() || input.is_active == Some(false)) {
        return Err(AppError::BadRequest(
            "You cannot change your own role or deactivate yourself".into(),
        ));
    }

    if let Some(role_name) = input.role.as_deref() {
        let role_id = RoleRepo::id_for(&state.pool, role_name)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("Unknown role '{role_name}'")))?;
        UserRepo::set_role(&state.pool, id, role_id).await?;
        tracing::info!(user_id = id, role = %role_name, admin_id = admin.user_id, "User role changed");
    }

    if let Some(is_active) = input.is_active {
        UserRepo::set_active(&state.pool, id, is_active).await?;
        if !is_active {
            let revoked = SessionRepo::revoke_all_for_user(&state.pool, id).await?;
            tracing::info!(user_id = id, revoked, admin_id = admin.user_id, "User deactivated");
        } else {
            tracing::info!(user_id = id, admin_id = admin.user_id, "User reactivated");
        }
    }

    let user = find_user(&state, id).await?;
    Ok(Json(DataResponse { data: user }))
}

/// POST /api/v1/admin/users/{id}/nuts
///
/// Credit or debit nuts. A debit that would make the balance negative is
/// rejected.
pub async fn adjust_nuts(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AdjustNutsRequest>,
) -> AppResult<Json<DataResponse<NutsBalance>>> {
    let note = input.reason.trim();
    if input.amount == 0 {
        return Err(CoreError::Validation("Amount must not be zero".into()).into());
    }
    if note.is_empty() || note.chars().count() > 200 {
        return Err(CoreError::Validation("Reason must be 1-200 characters".into()).into());
    }
    find_user(&state, id).await?;

    let reason = format!("{}: {note}", reasons::ADMIN_ADJUSTMENT);
    let nuts = CreditRepo::adjust(&state.pool, id, input.amount, &reason)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("Adjustment would make the balance negative".into())
        })?;

    tracing::info!(user_id = id, amount = input.amount, nuts, admin_id = admin.user_id, "Nuts adjusted");
    state.event_bus.publish(
        PlatformEvent::new(event_types::NUTS_ADJUSTED)
            .with_source("user", id)
            .with_actor(admin.user_id)
            .with_payload(serde_json::json!({
                "amount": input.amount,
                "reason": note,
                "balance": nuts,
            })),
    );
    Ok(Json(DataResponse {
        data: NutsBalance { user_id: id, nuts },
    }))
}

/// POST /api/v1/admin/users/{id}/subscription
///
/// Grant `plan_id` for `months` (default 1) without payment. Replaces the
/// user's current subscription like a paid activation does.
pub async fn grant_subscription(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<GrantSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Subscription>>)> {
    let months = input.months.unwrap_or(1);
    if !(1..=MAX_GRANT_MONTHS).contains(&months) {
        return Err(CoreError::Validation(format!(
            "Months must be between 1 and {MAX_GRANT_MONTHS}"
        ))
        .into());
    }
    find_user(&state, id).await?;
    let plan = PlanRepo::find_by_id(&state.pool, input.plan_id)
        .await?
        .ok_or_else(|| AppError::not_found("Plan", input.plan_id))?;

    let activation = subscriptions::activate(
        &state,
        id,
        &plan,
        PaymentProviderKind::Manual,
        None,
        Some(months),
    )
    .await?;

    tracing::info!(
        user_id = id,
        plan = %plan.code,
        months,
        admin_id = admin.user_id,
        "Subscription granted"
    );
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: activation.subscription,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/plans
///
/// All plans, including inactive ones.
pub async fn list_plans(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Plan>>>> {
    let plans = PlanRepo::list_all(&state.pool).await?;
    Ok(Json(DataResponse { data: plans }))
}

/// POST /api/v1/admin/plans
pub async fn create_plan(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(mut input): Json<CreatePlan>,
) -> AppResult<(StatusCode, Json<DataResponse<Plan>>)> {
    input.code = input.code.trim().to_lowercase();
    if input.code.is_empty() || input.name.trim().is_empty() {
        return Err(CoreError::Validation("Plan code and name are required".into()).into());
    }
    if input.price_cents < 0 || input.monthly_nuts.is_some_and(|n| n < 0) {
        return Err(CoreError::Validation(
            "Price and monthly nuts must not be negative".into(),
        )
        .into());
    }
    if let Some(interval) = input.billing_interval.as_deref() {
        PlanInterval::parse(interval)?;
    }
    validate_limits(
        input.daily_image_limit,
        input.daily_video_limit,
        input.daily_message_limit,
    )?;

    let plan = PlanRepo::create(&state.pool, &input).await?;
    tracing::info!(plan_id = plan.id, code = %plan.code, admin_id = admin.user_id, "Plan created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: plan })))
}

/// PUT /api/v1/admin/plans/{id}
pub async fn update_plan(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePlan>,
) -> AppResult<Json<DataResponse<Plan>>> {
    if input.price_cents.is_some_and(|p| p < 0) || input.monthly_nuts.is_some_and(|n| n < 0) {
        return Err(CoreError::Validation(
            "Price and monthly nuts must not be negative".into(),
        )
        .into());
    }
    validate_limits(
        input.daily_image_limit,
        input.daily_video_limit,
        input.daily_message_limit,
    )?;

    let plan = PlanRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Plan", id))?;
    tracing::info!(plan_id = id, admin_id = admin.user_id, "Plan updated");
    Ok(Json(DataResponse { data: plan }))
}

fn validate_limits(images: Option<i32>, videos: Option<i32>, messages: Option<i32>) -> AppResult<()> {
    if [images, videos, messages].iter().flatten().any(|l| *l < 0) {
        return Err(CoreError::Validation("Daily limits must not be negative".into()).into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/stats
pub async fn get_stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PlatformStats>>> {
    let pending = ModerationStatus::Pending.as_str();
    let stats = PlatformStats {
        users: UserRepo::count(&state.pool).await?,
        images: ImageRepo::count(&state.pool).await?,
        videos: VideoRepo::count(&state.pool).await?,
        active_subscriptions: SubscriptionRepo::count_active(&state.pool).await?,
        pending_images: ImageRepo::count_by_moderation_status(&state.pool, pending).await?,
        pending_videos: VideoRepo::count_by_moderation_status(&state.pool, pending).await?,
        nuts_spent_today: CreditRepo::spent_today(&state.pool).await?,
    };
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/admin/events?limit=&offset=
///
/// The persisted event log, newest first.
pub async fn list_events(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<Event>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let events = EventRepo::list_recent(&state.pool, limit, offset).await?;
    Ok(Json(DataResponse { data: events }))
}

async fn find_user(state: &AppState, id: DbId) -> AppResult<UserWithRole> {
    UserRepo::find_with_role(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))
}
