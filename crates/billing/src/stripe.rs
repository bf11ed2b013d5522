//! Stripe Checkout and subscription webhooks.
//!
//! Checkout sessions are created in `subscription` mode with the user and
//! plan carried both as `client_reference_id` and in session metadata.
//! Webhooks are authenticated with the `Stripe-Signature` header
//! (`t=<unix>,v1=<hex hmac>` over `"{t}.{body}"`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muse_core::billing::PaymentProviderKind;
use muse_core::hashing::verify_hmac_sha256_hex;
use muse_core::types::{DbId, Timestamp};
use reqwest::header::HeaderMap;

use crate::error::BillingError;
use crate::event::{format_reference, parse_reference, BillingEvent, BillingEventKind};
use crate::http::{ensure_success, env_opt, parse_json, str_at};
use crate::provider::{CheckoutRequest, CheckoutSession, PaymentProvider};

/// Signed webhooks older than this are rejected.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

impl StripeConfig {
    /// Load from the environment; `None` unless both secrets are set.
    ///
    /// | Variable                | Required | Default                  |
    /// |-------------------------|----------|--------------------------|
    /// | `STRIPE_SECRET_KEY`     | yes      | -                        |
    /// | `STRIPE_WEBHOOK_SECRET` | yes      | -                        |
    /// | `STRIPE_API_URL`        | no       | `https://api.stripe.com` |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env_opt("STRIPE_API_URL")
                .unwrap_or_else(|| "https://api.stripe.com".into())
                .trim_end_matches('/')
                .to_string(),
            secret_key: env_opt("STRIPE_SECRET_KEY")?,
            webhook_secret: env_opt("STRIPE_WEBHOOK_SECRET")?,
        })
    }
}

pub struct StripeClient {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(client: reqwest::Client, config: StripeConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let price = request
            .stripe_price_id
            .as_deref()
            .ok_or(BillingError::PlanUnavailable("stripe"))?;
        let reference = format_reference(request.user_id, request.plan_id);
        let user_id = request.user_id.to_string();
        let plan_id = request.plan_id.to_string();

        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", price),
            ("line_items[0][quantity]", "1"),
            ("customer_email", request.user_email.as_str()),
            ("client_reference_id", reference.as_str()),
            ("metadata[user_id]", user_id.as_str()),
            ("metadata[plan_id]", plan_id.as_str()),
            ("subscription_data[metadata][user_id]", user_id.as_str()),
            ("subscription_data[metadata][plan_id]", plan_id.as_str()),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_url))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;
        let body = parse_json(response).await?;

        let session_id = str_at(&body, "/id")
            .ok_or_else(|| BillingError::InvalidPayload("checkout session has no id".into()))?;
        let checkout_url = str_at(&body, "/url")
            .ok_or_else(|| BillingError::InvalidPayload("checkout session has no url".into()))?;

        tracing::info!(
            user_id = request.user_id,
            plan_id = request.plan_id,
            session_id,
            "Stripe checkout created"
        );
        Ok(CheckoutSession {
            provider: PaymentProviderKind::Stripe.as_str().to_string(),
            checkout_url: checkout_url.to_string(),
            session_id: session_id.to_string(),
        })
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), BillingError> {
        let url = format!(
            "{}/v1/subscriptions/{provider_subscription_id}",
            self.config.api_url
        );
        let request = if at_period_end {
            self.client
                .post(&url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.client.delete(&url)
        };
        let response = request
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<BillingEvent, BillingError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(BillingError::InvalidSignature)?;
        verify_signature(
            signature,
            body,
            &self.config.webhook_secret,
            Utc::now().timestamp(),
        )?;

        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        normalize_event(&value)
    }
}

// ---------------------------------------------------------------------------
// Signature verification
// ---------------------------------------------------------------------------

/// Check a `Stripe-Signature` header against the raw body.
///
/// Any `v1` entry may match (Stripe sends several while secrets roll).
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now_unix: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if now_unix.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature);
    }

    let mut payload = format!("{timestamp}.").into_bytes();
    payload.extend_from_slice(body);

    if signatures
        .iter()
        .any(|sig| verify_hmac_sha256_hex(secret, &payload, sig))
    {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}

// ---------------------------------------------------------------------------
// Event normalisation
// ---------------------------------------------------------------------------

/// Map a Stripe event document to a [`BillingEvent`].
pub fn normalize_event(value: &serde_json::Value) -> Result<BillingEvent, BillingError> {
    let event_id = str_at(value, "/id")
        .ok_or_else(|| BillingError::InvalidPayload("event has no id".into()))?;
    let event_type = str_at(value, "/type")
        .ok_or_else(|| BillingError::InvalidPayload("event has no type".into()))?;
    let object = value
        .pointer("/data/object")
        .ok_or_else(|| BillingError::InvalidPayload("event has no data.object".into()))?;

    let kind = match event_type {
        "checkout.session.completed" => checkout_completed(object)?,
        "invoice.paid" | "invoice.payment_succeeded" => invoice_paid(object),
        "invoice.payment_failed" => match invoice_subscription(object) {
            Some(id) => BillingEventKind::PaymentFailed {
                provider_subscription_id: id.to_string(),
            },
            None => BillingEventKind::Ignored,
        },
        "customer.subscription.updated" => {
            let cancelling = object
                .get("cancel_at_period_end")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            match str_at(object, "/id") {
                Some(id) if cancelling => BillingEventKind::SubscriptionCanceled {
                    provider_subscription_id: id.to_string(),
                    at_period_end: true,
                },
                _ => BillingEventKind::Ignored,
            }
        }
        "customer.subscription.deleted" => match str_at(object, "/id") {
            Some(id) => BillingEventKind::SubscriptionEnded {
                provider_subscription_id: id.to_string(),
            },
            None => BillingEventKind::Ignored,
        },
        _ => BillingEventKind::Ignored,
    };

    Ok(BillingEvent {
        provider: PaymentProviderKind::Stripe,
        event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        kind,
    })
}

fn checkout_completed(object: &serde_json::Value) -> Result<BillingEventKind, BillingError> {
    if str_at(object, "/mode") != Some("subscription") {
        return Ok(BillingEventKind::Ignored);
    }
    let subscription = str_at(object, "/subscription").ok_or_else(|| {
        BillingError::InvalidPayload("completed checkout has no subscription".into())
    })?;

    let from_metadata = || -> Option<(DbId, DbId)> {
        let user = str_at(object, "/metadata/user_id")?.parse().ok()?;
        let plan = str_at(object, "/metadata/plan_id")?.parse().ok()?;
        Some((user, plan))
    };
    let (user_id, plan_id) = str_at(object, "/client_reference_id")
        .and_then(parse_reference)
        .or_else(from_metadata)
        .ok_or_else(|| BillingError::InvalidPayload("checkout has no user/plan reference".into()))?;

    Ok(BillingEventKind::SubscriptionActivated {
        user_id,
        plan_id,
        provider_subscription_id: subscription.to_string(),
    })
}

/// Only cycle invoices renew; the first invoice is covered by the checkout.
fn invoice_paid(object: &serde_json::Value) -> BillingEventKind {
    if str_at(object, "/billing_reason") != Some("subscription_cycle") {
        return BillingEventKind::Ignored;
    }
    let Some(id) = invoice_subscription(object) else {
        return BillingEventKind::Ignored;
    };
    BillingEventKind::SubscriptionRenewed {
        provider_subscription_id: id.to_string(),
        period_start: unix_at(object, "/lines/data/0/period/start"),
        period_end: unix_at(object, "/lines/data/0/period/end"),
    }
}

/// The subscription an invoice belongs to, across API versions.
fn invoice_subscription(object: &serde_json::Value) -> Option<&str> {
    str_at(object, "/subscription")
        .or_else(|| str_at(object, "/parent/subscription_details/subscription"))
}

fn unix_at(value: &serde_json::Value, pointer: &str) -> Option<Timestamp> {
    let secs = value.pointer(pointer)?.as_i64()?;
    DateTime::from_timestamp(secs, 0)
}
