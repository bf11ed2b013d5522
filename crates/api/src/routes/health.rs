//! Liveness and readiness, mounted at the root rather than under `/api/v1`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, or `degraded` when the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    pub services: ServiceReport,
}

/// Which external services are configured. Unconfigured ones answer 503.
#[derive(Debug, Serialize)]
pub struct ServiceReport {
    pub gpu: bool,
    pub llm: bool,
    pub speech: bool,
    pub storage: bool,
    pub payments: Vec<&'static str>,
}

/// GET /health
///
/// Always 200 so load balancers keep routing; `db_healthy` tells whether
/// requests can be served.
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let db_healthy = muse_db::health_check(&state.pool).await.is_ok();
    Json(HealthReport {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        services: ServiceReport {
            gpu: state.gpu.is_configured(),
            llm: state.llm.is_configured(),
            speech: state.speech.is_configured(),
            storage: state.storage.is_configured(),
            payments: state.payments.kinds().iter().map(|k| k.as_str()).collect(),
        },
    })
}

/// GET /health/ready
///
/// 503 until the database answers.
async fn ready(State(state): State<AppState>) -> StatusCode {
    match muse_db::health_check(&state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}
