//! Handlers for the `/auth` resource: registration, login, token refresh,
//! logout, email verification and password reset.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use muse_core::credits::reasons;
use muse_core::error::CoreError;
use muse_core::roles::ROLE_USER;
use muse_core::tokens::{
    generate_token, hash_token, PURPOSE_RESET_PASSWORD, PURPOSE_VERIFY_EMAIL,
    RESET_PASSWORD_TTL_HOURS, VERIFY_EMAIL_TTL_HOURS,
};
use muse_core::types::DbId;
use muse_core::validation::{validate_input, validate_username};
use muse_db::models::session::NewRefreshSession;
use muse_db::models::user::{CreateUser, User};
use muse_db::repositories::{AuthTokenRepo, RoleRepo, SessionRepo, UserRepo};
use muse_events::{event_types, AccountMail, PlatformEvent};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::jwt::{generate_access_token, generate_refresh_token};
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Maximum consecutive failed login attempts before locking the account.
const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Duration in minutes to lock an account after exceeding failed attempts.
const LOCK_DURATION_MINS: i64 = 15;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    pub username: String,
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
}

/// Request body for `POST /auth/login`. `login` is a username or an email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub password: String,
}

/// Successful authentication response returned by register, login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
}

/// Public user info embedded in [`AuthResponse`].
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: DbId,
    pub username: String,
    pub email: String,
    pub role: String,
    pub nuts: i64,
    pub email_verified: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create a `user` account with the signup bonus, mail a verification link,
/// and sign the new user in.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    validate_input(&input)?;
    let username = input.username.trim().to_string();
    validate_username(&username)?;
    validate_password_strength(&input.password)?;
    let email = input.email.trim().to_lowercase();

    if UserRepo::find_by_login(&state.pool, &username)
        .await?
        .is_some_and(|u| u.username == username)
    {
        return Err(CoreError::Conflict("Username is already taken".into()).into());
    }
    if UserRepo::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(CoreError::Conflict("Email is already registered".into()).into());
    }

    let role_id = RoleRepo::id_for(&state.pool, ROLE_USER)
        .await?
        .ok_or_else(|| AppError::InternalError("Role 'user' is missing".into()))?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let user = UserRepo::create_with_bonus(
        &state.pool,
        &CreateUser {
            username,
            email,
            password_hash,
            role_id,
        },
        state.config.signup_bonus_nuts,
        reasons::SIGNUP_BONUS,
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    state.event_bus.publish(
        PlatformEvent::new(event_types::USER_REGISTERED)
            .with_source("user", user.id)
            .with_actor(user.id)
            .with_payload(serde_json::json!({ "username": user.username })),
    );

    send_verification_email(&state, &user).await?;

    let response =
        create_auth_response(&state, &user, ROLE_USER, user_agent(&headers), None).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
///
/// Authenticate with username or email + password. Returns access and
/// refresh tokens.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let invalid = || AppError::Core(CoreError::Unauthorized("Invalid login or password".into()));

    // 1. Find user by username or email.
    let user = UserRepo::find_by_login(&state.pool, input.login.trim())
        .await?
        .ok_or_else(invalid)?;

    // 2. Check if the account is active.
    if !user.is_active {
        return Err(AppError::forbidden("Account is deactivated"));
    }

    // 3. Check if the account is temporarily locked.
    if let Some(locked_until) = user.locked_until {
        if locked_until > Utc::now() {
            return Err(AppError::forbidden(
                "Account is temporarily locked. Try again later.",
            ));
        }
    }

    // 4. Verify password.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        // 5. On failure: increment counter, lock if threshold exceeded.
        let failed = UserRepo::increment_failed_login(&state.pool, user.id).await?;
        if failed >= MAX_FAILED_ATTEMPTS {
            let lock_until = Utc::now() + chrono::Duration::minutes(LOCK_DURATION_MINS);
            UserRepo::lock_account(&state.pool, user.id, lock_until).await?;
            tracing::warn!(user_id = user.id, failed, "Account locked after failed logins");
        }
        return Err(invalid());
    }

    // 6. On success: reset failed count, set last_login_at.
    UserRepo::record_successful_login(&state.pool, user.id).await?;

    let role = role_name(&state, user.role_id).await?;
    let response =
        create_auth_response(&state, &user, &role, user_agent(&headers), None).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/refresh
///
/// Spend a refresh token for a new token pair. A token works once.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let session = SessionRepo::consume(&state.pool, &hash_token(&input.refresh_token))
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid or expired refresh token".into(),
            ))
        })?;

    let user = UserRepo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;

    if !user.is_active {
        return Err(AppError::forbidden("Account is deactivated"));
    }

    let role = role_name(&state, user.role_id).await?;
    let response = create_auth_response(
        &state,
        &user,
        &role,
        user_agent(&headers),
        Some(session.id),
    )
    .await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/logout
///
/// Revoke all sessions for the authenticated user. Returns 204 No Content.
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<StatusCode> {
    SessionRepo::revoke_all_for_user(&state.pool, auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/verify-email
///
/// Consume a verification token and mark the address verified.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(input): Json<TokenRequest>,
) -> AppResult<StatusCode> {
    let token = AuthTokenRepo::consume(&state.pool, PURPOSE_VERIFY_EMAIL, &hash_token(&input.token))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".into()))?;

    UserRepo::mark_email_verified(&state.pool, token.user_id).await?;
    tracing::info!(user_id = token.user_id, "Email verified");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/verify-email/resend
///
/// Mail a fresh verification link. 409 when the address is already verified.
pub async fn resend_verification(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<StatusCode> {
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    if user.email_verified_at.is_some() {
        return Err(CoreError::Conflict("Email is already verified".into()).into());
    }

    send_verification_email(&state, &user).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/auth/password-reset
///
/// Always 202, whether or not the address belongs to an account.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(input): Json<PasswordResetRequest>,
) -> AppResult<StatusCode> {
    let email = input.email.trim().to_lowercase();
    let Some(user) = UserRepo::find_by_email(&state.pool, &email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(StatusCode::ACCEPTED);
    };
    if !user.is_active {
        return Ok(StatusCode::ACCEPTED);
    }

    AuthTokenRepo::invalidate_for_user(&state.pool, user.id, PURPOSE_RESET_PASSWORD).await?;
    let token = generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(RESET_PASSWORD_TTL_HOURS);
    AuthTokenRepo::create(
        &state.pool,
        user.id,
        PURPOSE_RESET_PASSWORD,
        &token.hash,
        expires_at,
    )
    .await?;

    let mail = AccountMail::PasswordReset {
        username: user.username.clone(),
        link: format!(
            "{}/reset-password?token={}",
            state.config.app_base_url, token.plaintext
        ),
    };
    if let Err(e) = state.mailer.send(&user.email, &mail).await {
        tracing::error!(user_id = user.id, error = %e, "Failed to send password reset email");
    }
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/auth/password-reset/confirm
///
/// Set a new password with a reset token. Revokes every session and clears
/// any lockout.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(input): Json<PasswordResetConfirm>,
) -> AppResult<StatusCode> {
    validate_password_strength(&input.password)?;

    let token = AuthTokenRepo::consume(
        &state.pool,
        PURPOSE_RESET_PASSWORD,
        &hash_token(&input.token),
    )
    .await?
    .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".into()))?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    UserRepo::update_password(&state.pool, token.user_id, &password_hash).await?;
    SessionRepo::revoke_all_for_user(&state.pool, token.user_id).await?;

    tracing::info!(user_id = token.user_id, "Password reset");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn role_name(state: &AppState, role_id: DbId) -> AppResult<String> {
    RoleRepo::name_of(&state.pool, role_id)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("Role {role_id} is missing")))
}

/// Issue a 24 h verification token and mail the link. Delivery errors are
/// logged only.
pub(crate) async fn send_verification_email(state: &AppState, user: &User) -> AppResult<()> {
    AuthTokenRepo::invalidate_for_user(&state.pool, user.id, PURPOSE_VERIFY_EMAIL).await?;
    let token = generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(VERIFY_EMAIL_TTL_HOURS);
    AuthTokenRepo::create(
        &state.pool,
        user.id,
        PURPOSE_VERIFY_EMAIL,
        &token.hash,
        expires_at,
    )
    .await?;

    let mail = AccountMail::VerifyEmail {
        username: user.username.clone(),
        link: format!(
            "{}/verify-email?token={}",
            state.config.app_base_url, token.plaintext
        ),
    };
    if let Err(e) = state.mailer.send(&user.email, &mail).await {
        tracing::error!(user_id = user.id, error = %e, "Failed to send verification email");
    }
    Ok(())
}

/// Issue a token pair and store its refresh session.
async fn create_auth_response(
    state: &AppState,
    user: &User,
    role: &str,
    user_agent: Option<&str>,
    rotated_from: Option<DbId>,
) -> AppResult<AuthResponse> {
    let access_token = generate_access_token(user.id, role, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let refresh = generate_refresh_token();
    let expires_at = Utc::now() + state.config.jwt.refresh_ttl();

    SessionRepo::create(
        &state.pool,
        &NewRefreshSession {
            user_id: user.id,
            token_hash: &refresh.hash,
            expires_at,
            user_agent,
            rotated_from,
        },
    )
    .await?;

    Ok(AuthResponse {
        access_token,
        refresh_token: refresh.plaintext,
        expires_in: state.config.jwt.access_ttl_secs(),
        user: UserInfo {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: role.to_string(),
            nuts: user.nuts,
            email_verified: user.email_verified_at.is_some(),
        },
    })
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
}
