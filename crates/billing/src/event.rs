//! Provider-neutral billing events.

use muse_core::billing::PaymentProviderKind;
use muse_core::types::{DbId, Timestamp};

/// A verified webhook delivery, normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingEvent {
    pub provider: PaymentProviderKind,
    /// The provider's event id, used for idempotency.
    pub event_id: String,
    /// The provider's raw event type, kept for the log.
    pub event_type: String,
    pub kind: BillingEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEventKind {
    /// Checkout finished: the user now holds `plan_id`.
    SubscriptionActivated {
        user_id: DbId,
        plan_id: DbId,
        provider_subscription_id: String,
    },
    /// A recurring payment succeeded. Periods are present when the provider
    /// reports them.
    SubscriptionRenewed {
        provider_subscription_id: String,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
    },
    PaymentFailed {
        provider_subscription_id: String,
    },
    /// The subscriber canceled. With `at_period_end` access continues until
    /// the period ends.
    SubscriptionCanceled {
        provider_subscription_id: String,
        at_period_end: bool,
    },
    /// The provider ended the subscription for good.
    SubscriptionEnded {
        provider_subscription_id: String,
    },
    /// Anything the platform does not act on.
    Ignored,
}

impl BillingEventKind {
    /// The provider subscription this event is about, if any.
    pub fn provider_subscription_id(&self) -> Option<&str> {
        match self {
            BillingEventKind::SubscriptionActivated {
                provider_subscription_id,
                ..
            }
            | BillingEventKind::SubscriptionRenewed {
                provider_subscription_id,
                ..
            }
            | BillingEventKind::PaymentFailed {
                provider_subscription_id,
            }
            | BillingEventKind::SubscriptionCanceled {
                provider_subscription_id,
                ..
            }
            | BillingEventKind::SubscriptionEnded {
                provider_subscription_id,
            } => Some(provider_subscription_id),
            BillingEventKind::Ignored => None,
        }
    }
}

/// Parse `"{user_id}:{plan_id}"` as carried in checkout metadata.
pub fn parse_reference(reference: &str) -> Option<(DbId, DbId)> {
    let (user, plan) = reference.split_once(':')?;
    Some((user.trim().parse().ok()?, plan.trim().parse().ok()?))
}

/// Format the checkout reference for a user and plan.
pub fn format_reference(user_id: DbId, plan_id: DbId) -> String {
    format!("{user_id}:{plan_id}")
}
