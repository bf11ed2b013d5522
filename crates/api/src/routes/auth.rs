//! Route definitions for the `/auth` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /register                  -> register
/// POST /login                     -> login
/// POST /refresh                   -> refresh
/// POST /logout                    -> logout (requires auth)
/// POST /verify-email              -> verify_email
/// POST /verify-email/resend       -> resend_verification (requires auth)
/// POST /password-reset            -> request_password_reset
/// POST /password-reset/confirm    -> confirm_password_reset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/verify-email", post(auth::verify_email))
        .route("/verify-email/resend", post(auth::resend_verification))
        .route("/password-reset", post(auth::request_password_reset))
        .route("/password-reset/confirm", post(auth::confirm_password_reset))
}
