use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use muse_billing::BillingError;
use muse_core::error::CoreError;
use muse_providers::ProviderError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Every variant renders as `{ "error": message, "code": CODE }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A GPU, LLM, TTS or storage call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A payment gateway call or webhook failed.
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// The 401 returned for a missing or unusable bearer token.
    pub fn not_authenticated() -> Self {
        AppError::Core(CoreError::Unauthorized("Not authenticated".into()))
    }

    pub fn not_found(entity: &'static str, id: muse_core::types::DbId) -> Self {
        AppError::Core(CoreError::NotFound { entity, id })
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Core(CoreError::Forbidden(msg.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::Provider(err) => classify_provider_error(err),
            AppError::Billing(err) => classify_billing_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    if !err.is_public() {
        tracing::error!(error = %err, "Internal core error");
        return internal();
    }
    let status = match err {
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::InsufficientNuts { .. } => StatusCode::PAYMENT_REQUIRED,
        CoreError::DailyLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.code(), err.to_string())
}

/// - `RowNotFound` maps to 404.
/// - Unique violations on `uq_*` constraints map to 409.
/// - Everything else is a logged 500.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

fn classify_provider_error(err: &ProviderError) -> (StatusCode, &'static str, String) {
    match err {
        ProviderError::NotConfigured(what) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "PROVIDER_NOT_CONFIGURED",
            format!("{what} is not configured"),
        ),
        other => {
            tracing::error!(error = %other, "Provider call failed");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                other.to_string(),
            )
        }
    }
}

fn classify_billing_error(err: &BillingError) -> (StatusCode, &'static str, String) {
    match err {
        BillingError::InvalidSignature => (
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            err.to_string(),
        ),
        BillingError::InvalidPayload(msg) => {
            (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", msg.clone())
        }
        BillingError::PlanUnavailable(_) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
        }
        BillingError::Request(_) | BillingError::Api { .. } => {
            tracing::error!(error = %err, "Payment provider call failed");
            (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR", err.to_string())
        }
    }
}
