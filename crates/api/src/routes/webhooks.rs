//! Route definitions for inbound webhooks.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`. Authenticated by signature, not bearer
/// token.
///
/// ```text
/// POST /gpu       -> gpu_webhook (?kind, id, sig)
/// POST /stripe    -> stripe_webhook
/// POST /paypal    -> paypal_webhook
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gpu", post(webhooks::gpu_webhook))
        .route("/stripe", post(webhooks::stripe_webhook))
        .route("/paypal", post(webhooks::paypal_webhook))
}
