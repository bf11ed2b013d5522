//! Inbound webhooks: GPU job completion and payment provider events.
//!
//! None of these routes use bearer auth. GPU callbacks carry an HMAC of
//! the row they refer to in the query string; payment webhooks are verified
//! by the provider client.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use muse_core::billing::PaymentProviderKind;
use muse_core::error::CoreError;
use muse_core::generation::MediaKind;
use muse_core::types::DbId;
use muse_db::repositories::WebhookEventRepo;
use muse_providers::GpuJob;
use serde::{Deserialize, Serialize};

use crate::engine::{jobs, subscriptions};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GpuWebhookParams {
    pub kind: MediaKind,
    pub id: DbId,
    pub sig: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

impl WebhookAck {
    fn new() -> Self {
        Self {
            received: true,
            duplicate: false,
        }
    }
}

/// POST /api/v1/webhooks/gpu?kind=image|video&id=N&sig=HEX
///
/// Always acknowledges once the signature checks out, so the provider does
/// not redeliver updates for rows that no longer exist.
pub async fn gpu_webhook(
    State(state): State<AppState>,
    Query(params): Query<GpuWebhookParams>,
    Json(update): Json<GpuJob>,
) -> AppResult<Json<WebhookAck>> {
    if !jobs::verify_webhook_signature(
        &state.config.webhook_secret,
        params.kind,
        params.id,
        &params.sig,
    ) {
        tracing::warn!(kind = params.kind.as_str(), id = params.id, "GPU webhook with bad signature");
        return Err(CoreError::Unauthorized("Invalid webhook signature".into()).into());
    }

    let Some(job) = jobs::load(&state, params.kind, params.id).await? else {
        tracing::info!(kind = params.kind.as_str(), id = params.id, "GPU webhook for missing row");
        return Ok(Json(WebhookAck::new()));
    };

    if let Some(expected) = job.provider_job_id.as_deref() {
        if !update.id.is_empty() && update.id != expected {
            tracing::warn!(
                kind = params.kind.as_str(),
                id = params.id,
                expected,
                received = %update.id,
                "GPU webhook for a different provider job, ignoring"
            );
            return Ok(Json(WebhookAck::new()));
        }
    }

    tracing::debug!(
        kind = params.kind.as_str(),
        id = params.id,
        status = %update.status,
        "GPU webhook received"
    );
    jobs::apply_update(&state, &job, &update).await?;
    Ok(Json(WebhookAck::new()))
}

/// POST /api/v1/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    billing_webhook(&state, PaymentProviderKind::Stripe, &headers, &body).await
}

/// POST /api/v1/webhooks/paypal
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    billing_webhook(&state, PaymentProviderKind::Paypal, &headers, &body).await
}

/// Verify, deduplicate and apply one payment webhook delivery.
///
/// A delivery whose processing fails is forgotten again so the provider's
/// retry is processed from scratch.
async fn billing_webhook(
    state: &AppState,
    kind: PaymentProviderKind,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Json<WebhookAck>> {
    let provider = state.payments.get(kind).ok_or_else(|| {
        AppError::BadRequest(format!("{} payments are not available", kind.as_str()))
    })?;

    let event = provider.verify_webhook(headers, body).await?;
    let provider_name = kind.as_str();

    if !WebhookEventRepo::record_once(&state.pool, provider_name, &event.event_id, &event.event_type)
        .await?
    {
        tracing::debug!(provider = provider_name, event_id = %event.event_id, "Duplicate billing webhook");
        return Ok(Json(WebhookAck {
            received: true,
            duplicate: true,
        }));
    }

    tracing::info!(
        provider = provider_name,
        event_id = %event.event_id,
        event_type = %event.event_type,
        "Billing webhook received"
    );

    if let Err(e) = subscriptions::apply_billing_event(state, &event).await {
        tracing::error!(
            provider = provider_name,
            event_id = %event.event_id,
            error = %e,
            "Failed to apply billing event"
        );
        if let Err(forget_err) =
            WebhookEventRepo::forget(&state.pool, provider_name, &event.event_id).await
        {
            tracing::error!(event_id = %event.event_id, error = %forget_err, "Failed to forget billing webhook");
        }
        return Err(e);
    }

    Ok(Json(WebhookAck::new()))
}
