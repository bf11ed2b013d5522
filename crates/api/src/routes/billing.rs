//! Route definitions for plans and subscriptions.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::billing;
use crate::state::AppState;

/// Routes mounted at `/plans`.
///
/// ```text
/// GET /    -> list_plans (public)
/// ```
pub fn plans_router() -> Router<AppState> {
    Router::new().route("/", get(billing::list_plans))
}

/// Routes mounted at `/subscriptions`.
///
/// ```text
/// POST /checkout    -> checkout
/// GET  /current     -> current_subscription
/// POST /cancel      -> cancel_subscription
/// ```
pub fn subscriptions_router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(billing::checkout))
        .route("/current", get(billing::current_subscription))
        .route("/cancel", post(billing::cancel_subscription))
}
