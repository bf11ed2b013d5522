//! PayPal subscriptions over the REST API.
//!
//! Checkout creates a subscription in `APPROVAL_PENDING` state and returns
//! its `approve` link. The user and plan travel in `custom_id` as
//! `"{user_id}:{plan_id}"`. Webhooks are verified by asking PayPal through
//! `/v1/notifications/verify-webhook-signature`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use muse_core::billing::PaymentProviderKind;
use reqwest::header::HeaderMap;
use serde_json::json;

use crate::error::BillingError;
use crate::event::{format_reference, parse_reference, BillingEvent, BillingEventKind};
use crate::http::{ensure_success, env_opt, parse_json, str_at};
use crate::provider::{CheckoutRequest, CheckoutSession, PaymentProvider};

/// Headers PayPal signs each webhook delivery with.
const TRANSMISSION_HEADERS: [(&str, &str); 5] = [
    ("auth_algo", "paypal-auth-algo"),
    ("cert_url", "paypal-cert-url"),
    ("transmission_id", "paypal-transmission-id"),
    ("transmission_sig", "paypal-transmission-sig"),
    ("transmission_time", "paypal-transmission-time"),
];

/// Refresh the OAuth token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub brand_name: String,
}

impl PayPalConfig {
    /// Load from the environment; `None` unless credentials and the webhook
    /// id are all set.
    ///
    /// | Variable               | Required | Default                        |
    /// |------------------------|----------|--------------------------------|
    /// | `PAYPAL_CLIENT_ID`     | yes      | -                              |
    /// | `PAYPAL_CLIENT_SECRET` | yes      | -                              |
    /// | `PAYPAL_WEBHOOK_ID`    | yes      | -                              |
    /// | `PAYPAL_API_URL`       | no       | `https://api-m.paypal.com`     |
    /// | `PAYPAL_BRAND_NAME`    | no       | `Muse`                         |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env_opt("PAYPAL_API_URL")
                .unwrap_or_else(|| "https://api-m.paypal.com".into())
                .trim_end_matches('/')
                .to_string(),
            client_id: env_opt("PAYPAL_CLIENT_ID")?,
            client_secret: env_opt("PAYPAL_CLIENT_SECRET")?,
            webhook_id: env_opt("PAYPAL_WEBHOOK_ID")?,
            brand_name: env_opt("PAYPAL_BRAND_NAME").unwrap_or_else(|| "Muse".into()),
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PayPalClient {
    client: reqwest::Client,
    config: PayPalConfig,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    pub fn new(client: reqwest::Client, config: PayPalConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    /// Client-credentials access token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String, BillingError> {
        if let Ok(guard) = self.token.lock() {
            if let Some(token) = guard.as_ref().filter(|t| t.expires_at > Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let body = parse_json(response).await?;

        let value = str_at(&body, "/access_token")
            .ok_or_else(|| BillingError::InvalidPayload("token response has no access_token".into()))?
            .to_string();
        let lifetime = body
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(CachedToken {
                value: value.clone(),
                expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
            });
        }
        Ok(value)
    }
}

#[async_trait]
impl PaymentProvider for PayPalClient {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Paypal
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let plan = request
            .paypal_plan_id
            .as_deref()
            .ok_or(BillingError::PlanUnavailable("paypal"))?;
        let token = self.access_token().await?;

        let payload = json!({
            "plan_id": plan,
            "custom_id": format_reference(request.user_id, request.plan_id),
            "subscriber": { "email_address": request.user_email },
            "application_context": {
                "brand_name": self.config.brand_name,
                "user_action": "SUBSCRIBE_NOW",
                "shipping_preference": "NO_SHIPPING",
                "return_url": request.success_url,
                "cancel_url": request.cancel_url,
            },
        });

        let response = self
            .client
            .post(self.url("/v1/billing/subscriptions"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;
        let body = parse_json(response).await?;

        let session_id = str_at(&body, "/id")
            .ok_or_else(|| BillingError::InvalidPayload("subscription has no id".into()))?;
        let checkout_url = approve_link(&body)
            .ok_or_else(|| BillingError::InvalidPayload("subscription has no approve link".into()))?;

        tracing::info!(
            user_id = request.user_id,
            plan_id = request.plan_id,
            subscription_id = session_id,
            "PayPal subscription created"
        );
        Ok(CheckoutSession {
            provider: PaymentProviderKind::Paypal.as_str().to_string(),
            checkout_url: checkout_url.to_string(),
            session_id: session_id.to_string(),
        })
    }

    /// PayPal stops billing immediately either way; `at_period_end` only
    /// matters for how long the platform keeps the benefits.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        _at_period_end: bool,
    ) -> Result<(), BillingError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!(
                "/v1/billing/subscriptions/{provider_subscription_id}/cancel"
            )))
            .bearer_auth(&token)
            .json(&json!({ "reason": "Canceled by subscriber" }))
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
        let event: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        let mut payload = serde_json::Map::new();
        for (field, header) in TRANSMISSION_HEADERS {
            let value = headers
                .get(header)
                .and_then(|v| v.to_str().ok())
                .ok_or(BillingError::InvalidSignature)?;
            payload.insert(field.to_string(), json!(value));
        }
        payload.insert("webhook_id".into(), json!(self.config.webhook_id));
        payload.insert("webhook_event".into(), event.clone());

        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;
        let verdict = parse_json(response).await?;

        if str_at(&verdict, "/verification_status") != Some("SUCCESS") {
            tracing::warn!("PayPal webhook signature rejected");
            return Err(BillingError::InvalidSignature);
        }
        normalize_event(&event)
    }
}

fn approve_link(body: &serde_json::Value) -> Option<&str> {
    body.get("links")?
        .as_array()?
        .iter()
        .find(|link| str_at(link, "/rel") == Some("approve"))
        .and_then(|link| str_at(link, "/href"))
}

/// Map a PayPal webhook event to a [`BillingEvent`].
pub fn normalize_event(value: &serde_json::Value) -> Result<BillingEvent, BillingError> {
    let event_id = str_at(value, "/id")
        .ok_or_else(|| BillingError::InvalidPayload("event has no id".into()))?;
    let event_type = str_at(value, "/event_type")
        .ok_or_else(|| BillingError::InvalidPayload("event has no event_type".into()))?;
    let resource = value
        .get("resource")
        .ok_or_else(|| BillingError::InvalidPayload("event has no resource".into()))?;

    let subscription_id = || str_at(resource, "/id").map(str::to_string);

    let kind = match event_type {
        "BILLING.SUBSCRIPTION.ACTIVATED" => {
            let id = subscription_id()
                .ok_or_else(|| BillingError::InvalidPayload("subscription has no id".into()))?;
            let (user_id, plan_id) = str_at(resource, "/custom_id")
                .and_then(parse_reference)
                .ok_or_else(|| BillingError::InvalidPayload("subscription has no custom_id".into()))?;
            BillingEventKind::SubscriptionActivated {
                user_id,
                plan_id,
                provider_subscription_id: id,
            }
        }
        "PAYMENT.SALE.COMPLETED" => match str_at(resource, "/billing_agreement_id") {
            Some(id) => BillingEventKind::SubscriptionRenewed {
                provider_subscription_id: id.to_string(),
                period_start: None,
                period_end: None,
            },
            None => BillingEventKind::Ignored,
        },
        "BILLING.SUBSCRIPTION.PAYMENT.FAILED" | "BILLING.SUBSCRIPTION.SUSPENDED" => {
            match subscription_id() {
                Some(id) => BillingEventKind::PaymentFailed {
                    provider_subscription_id: id,
                },
                None => BillingEventKind::Ignored,
            }
        }
        "BILLING.SUBSCRIPTION.CANCELLED" => match subscription_id() {
            Some(id) => BillingEventKind::SubscriptionCanceled {
                provider_subscription_id: id,
                at_period_end: true,
            },
            None => BillingEventKind::Ignored,
        },
        "BILLING.SUBSCRIPTION.EXPIRED" => match subscription_id() {
            Some(id) => BillingEventKind::SubscriptionEnded {
                provider_subscription_id: id,
            },
            None => BillingEventKind::Ignored,
        },
        _ => BillingEventKind::Ignored,
    };

    Ok(BillingEvent {
        provider: PaymentProviderKind::Paypal,
        event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn activation_reads_custom_id() {
        let event = normalize_event(&json!({
            "id": "WH-1",
            "event_type": "BILLING.SUBSCRIPTION.ACTIVATED",
            "resource": { "id": "I-ABC", "custom_id": "5:2", "status": "ACTIVE" }
        }))
        .unwrap();
        assert_eq!(event.provider, PaymentProviderKind::Paypal);
        assert_eq!(
            event.kind,
            BillingEventKind::SubscriptionActivated {
                user_id: 5,
                plan_id: 2,
                provider_subscription_id: "I-ABC".into()
            }
        );
    }

    #[test]
    fn activation_without_reference_is_rejected() {
        assert_matches!(
            normalize_event(&json!({
                "id": "WH-1",
                "event_type": "BILLING.SUBSCRIPTION.ACTIVATED",
                "resource": { "id": "I-ABC" }
            })),
            Err(BillingError::InvalidPayload(_))
        );
    }

    #[test]
    fn sale_completed_renews_by_agreement() {
        let event = normalize_event(&json!({
            "id": "WH-2",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": { "id": "SALE-1", "billing_agreement_id": "I-ABC" }
        }))
        .unwrap();
        assert_eq!(
            event.kind,
            BillingEventKind::SubscriptionRenewed {
                provider_subscription_id: "I-ABC".into(),
                period_start: None,
                period_end: None
            }
        );

        let one_off = normalize_event(&json!({
            "id": "WH-3",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": { "id": "SALE-2" }
        }))
        .unwrap();
        assert_eq!(one_off.kind, BillingEventKind::Ignored);
    }

    #[test]
    fn lifecycle_events() {
        let kind = |event_type: &str| {
            normalize_event(&json!({
                "id": "WH", "event_type": event_type, "resource": { "id": "I-ABC" }
            }))
            .unwrap()
            .kind
        };
        assert_matches!(
            kind("BILLING.SUBSCRIPTION.SUSPENDED"),
            BillingEventKind::PaymentFailed { .. }
        );
        assert_matches!(
            kind("BILLING.SUBSCRIPTION.CANCELLED"),
            BillingEventKind::SubscriptionCanceled { at_period_end: true, .. }
        );
        assert_matches!(
            kind("BILLING.SUBSCRIPTION.EXPIRED"),
            BillingEventKind::SubscriptionEnded { .. }
        );
        assert_eq!(kind("CUSTOMER.DISPUTE.CREATED"), BillingEventKind::Ignored);
    }

    #[test]
    fn approve_link_lookup() {
        let body = json!({
            "id": "I-ABC",
            "links": [
                { "rel": "self", "href": "https://api/self" },
                { "rel": "approve", "href": "https://paypal/approve" }
            ]
        });
        assert_eq!(approve_link(&body), Some("https://paypal/approve"));
        assert_eq!(approve_link(&json!({})), None);
    }
}
