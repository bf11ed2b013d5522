//! Route definitions for the caller's own account.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::account;
use crate::state::AppState;

/// Routes mounted at `/me`.
///
/// ```text
/// GET    /            -> get_me
/// PUT    /            -> update_me
/// PUT    /password    -> change_password
/// GET    /nuts        -> list_nut_transactions
/// GET    /sessions    -> list_sessions
/// DELETE /sessions    -> revoke_sessions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(account::get_me).put(account::update_me))
        .route("/password", put(account::change_password))
        .route("/nuts", get(account::list_nut_transactions))
        .route(
            "/sessions",
            get(account::list_sessions).delete(account::revoke_sessions),
        )
}
