//! Handlers for the caller's own account under `/me`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use muse_core::credits::{remaining, UsageKind};
use muse_core::error::CoreError;
use muse_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use muse_core::types::{DbId, Timestamp};
use muse_core::validation::validate_username;
use muse_db::models::nut_transaction::NutTransaction;
use muse_db::models::plan::Plan;
use muse_db::models::subscription::Subscription;
use muse_db::models::user::{UpdateProfile, UserResponse};
use muse_db::repositories::{CreditRepo, PlanRepo, SessionRepo, SubscriptionRepo, UserRepo};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::engine::credits;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::{role_name, send_verification_email};
use crate::middleware::auth::AuthUser;
use crate::query::PaginationParams;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountOverview {
    pub user: UserResponse,
    pub subscription: Option<CurrentSubscription>,
    pub usage: UsageOverview,
}

#[derive(Debug, Serialize)]
pub struct CurrentSubscription {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: Option<Plan>,
}

/// Today's usage against the limits that apply to the caller.
#[derive(Debug, Serialize)]
pub struct UsageOverview {
    pub images: UsageLine,
    pub videos: UsageLine,
    pub messages: UsageLine,
}

#[derive(Debug, Serialize)]
pub struct UsageLine {
    pub used: i32,
    /// `null` means unlimited.
    pub limit: Option<i32>,
    pub remaining: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// GET /api/v1/me
pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<AccountOverview>>> {
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;
    let role = role_name(&state, user.role_id).await?;

    let subscription = match SubscriptionRepo::find_current_for_user(&state.pool, user.id).await? {
        Some(subscription) => {
            let plan = PlanRepo::find_by_id(&state.pool, subscription.plan_id).await?;
            Some(CurrentSubscription { subscription, plan })
        }
        None => None,
    };

    let limits = credits::limits_for(&state, user.id).await?;
    let counts = CreditRepo::usage_today(&state.pool, user.id).await?;
    let line = |kind: UsageKind| {
        let used = counts
            .iter()
            .find(|c| c.kind == kind.as_str())
            .map_or(0, |c| c.count);
        let limit = limits.limit_for(kind);
        UsageLine {
            used,
            limit,
            remaining: remaining(limit, used),
        }
    };

    Ok(Json(DataResponse {
        data: AccountOverview {
            user: UserResponse::from_user(&user, &role),
            subscription,
            usage: UsageOverview {
                images: line(UsageKind::Image),
                videos: line(UsageKind::Video),
                messages: line(UsageKind::Message),
            },
        },
    }))
}

/// PUT /api/v1/me
///
/// Change username and/or email. A new email must be verified again; a fresh
/// verification link is mailed.
pub async fn update_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(mut input): Json<UpdateProfile>,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    if let Some(username) = input.username.as_mut() {
        *username = username.trim().to_string();
        validate_username(username)?;
    }
    if let Some(email) = input.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !email.validate_email() {
            return Err(CoreError::Validation("Email must be a valid email address".into()).into());
        }
    }

    let before = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    let user = UserRepo::update_profile(&state.pool, auth_user.user_id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    if user.email != before.email {
        tracing::info!(user_id = user.id, "Email changed, verification reset");
        send_verification_email(&state, &user).await?;
    }

    let role = role_name(&state, user.role_id).await?;
    Ok(Json(DataResponse {
        data: UserResponse::from_user(&user, &role),
    }))
}

/// PUT /api/v1/me/password
///
/// Requires the current password. Other sessions stay signed in.
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    validate_password_strength(&input.new_password)?;

    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    let valid = verify_password(&input.current_password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !valid {
        return Err(CoreError::Unauthorized("Current password is incorrect".into()).into());
    }

    let password_hash = hash_password(&input.new_password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    UserRepo::update_password(&state.pool, user.id, &password_hash).await?;
    tracing::info!(user_id = user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/me/nuts
///
/// The caller's nut ledger, newest first.
pub async fn list_nut_transactions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PageResponse<NutTransaction>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);

    let data =
        CreditRepo::list_transactions(&state.pool, auth_user.user_id, limit, offset).await?;
    let total = CreditRepo::count_transactions(&state.pool, auth_user.user_id).await?;
    Ok(Json(PageResponse {
        data,
        total,
        limit,
        offset,
    }))
}

/// A signed-in device, without its token.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: DbId,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// GET /api/v1/me/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<Vec<SessionInfo>>>> {
    let sessions = SessionRepo::list_live_for_user(&state.pool, auth_user.user_id)
        .await?
        .into_iter()
        .map(|s| SessionInfo {
            id: s.id,
            user_agent: s.user_agent,
            created_at: s.created_at,
            expires_at: s.expires_at,
        })
        .collect();
    Ok(Json(DataResponse { data: sessions }))
}

/// DELETE /api/v1/me/sessions
///
/// Sign out everywhere.
pub async fn revoke_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<StatusCode> {
    let revoked = SessionRepo::revoke_all_for_user(&state.pool, auth_user.user_id).await?;
    tracing::info!(user_id = auth_user.user_id, revoked, "Sessions revoked");
    Ok(StatusCode::NO_CONTENT)
}
