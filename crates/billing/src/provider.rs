//! The payment provider abstraction.

use async_trait::async_trait;
use muse_core::billing::PaymentProviderKind;
use muse_core::types::DbId;
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::error::BillingError;
use crate::event::BillingEvent;

/// Everything a gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: DbId,
    pub user_email: String,
    pub plan_id: DbId,
    pub plan_name: String,
    /// Stripe price id of the plan, when it has one.
    pub stripe_price_id: Option<String>,
    /// PayPal plan id of the plan, when it has one.
    pub paypal_plan_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Where to send the user to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub provider: String,
    pub checkout_url: String,
    pub session_id: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> PaymentProviderKind;

    async fn create_checkout(&self, request: &CheckoutRequest)
        -> Result<CheckoutSession, BillingError>;

    /// Cancel a subscription, either at the end of the paid period or now.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), BillingError>;

    /// Authenticate a webhook delivery and normalise it.
    async fn verify_webhook(&self, headers: &HeaderMap, body: &[u8])
        -> Result<BillingEvent, BillingError>;
}
