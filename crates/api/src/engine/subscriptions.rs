//! Subscription lifecycle driven by billing events and admin grants.

use chrono::Utc;
use muse_billing::{BillingEvent, BillingEventKind};
use muse_core::billing::{
    period_end, renewal_starts_new_period, PaymentProviderKind, PlanInterval,
};
use muse_core::types::DbId;
use muse_db::models::plan::Plan;
use muse_db::models::subscription::{ActivateSubscription, Activation, Subscription};
use muse_db::repositories::{PlanRepo, SubscriptionRepo, UserRepo};
use muse_events::{event_types, PlatformEvent};

use crate::error::AppResult;
use crate::state::AppState;

/// Activate `plan` for `user_id` for `months` (or one plan interval).
///
/// Any other current subscription of the user is canceled in the same
/// transaction; provider-billed ones are then canceled at the provider,
/// best-effort.
pub async fn activate(
    state: &AppState,
    user_id: DbId,
    plan: &Plan,
    provider: PaymentProviderKind,
    provider_subscription_id: Option<String>,
    months: Option<u32>,
) -> AppResult<Activation> {
    let now = Utc::now();
    let end = match months {
        Some(months) => period_end(now, PlanInterval::Month, months),
        None => period_end(now, PlanInterval::parse(&plan.billing_interval)?, 1),
    };

    let activation = SubscriptionRepo::activate(
        &state.pool,
        &ActivateSubscription {
            user_id,
            plan_id: plan.id,
            provider: provider.as_str().to_string(),
            provider_subscription_id,
            period_start: now,
            period_end: end,
            grant_nuts: i64::from(plan.monthly_nuts),
        },
    )
    .await?;

    if !activation.created {
        tracing::info!(
            user_id,
            subscription_id = activation.subscription.id,
            "Activation replayed, subscription already recorded"
        );
        return Ok(activation);
    }

    tracing::info!(
        user_id,
        plan = %plan.code,
        provider = provider.as_str(),
        subscription_id = activation.subscription.id,
        replaced = activation.replaced.len(),
        "Subscription activated"
    );

    for old in &activation.replaced {
        cancel_at_provider(state, old).await;
    }

    state.event_bus.publish(
        PlatformEvent::new(event_types::SUBSCRIPTION_ACTIVATED)
            .with_source("subscription", activation.subscription.id)
            .with_actor(user_id)
            .with_payload(serde_json::json!({
                "plan_id": plan.id,
                "provider": provider.as_str(),
                "replaced": activation.replaced.iter().map(|s| s.id).collect::<Vec<_>>(),
            })),
    );
    Ok(activation)
}

/// Cancel a replaced subscription at its provider. Errors are logged.
async fn cancel_at_provider(state: &AppState, subscription: &Subscription) {
    let Ok(kind) = PaymentProviderKind::parse(&subscription.provider) else {
        return;
    };
    let Some(reference) = subscription.provider_subscription_id.as_deref() else {
        return;
    };
    let Some(provider) = state.payments.get(kind) else {
        tracing::warn!(
            subscription_id = subscription.id,
            provider = kind.as_str(),
            "Provider not configured, cannot cancel replaced subscription"
        );
        return;
    };

    if let Err(e) = provider.cancel_subscription(reference, false).await {
        tracing::error!(
            subscription_id = subscription.id,
            provider = kind.as_str(),
            error = %e,
            "Failed to cancel replaced subscription at provider"
        );
    }
}

/// Apply a verified, normalized billing event.
///
/// Events about unknown users, plans or subscriptions are logged and
/// skipped so the provider stops redelivering them.
pub async fn apply_billing_event(state: &AppState, event: &BillingEvent) -> AppResult<()> {
    match &event.kind {
        BillingEventKind::SubscriptionActivated {
            user_id,
            plan_id,
            provider_subscription_id,
        } => {
            let Some(plan) = PlanRepo::find_by_id(&state.pool, *plan_id).await? else {
                tracing::warn!(plan_id, event_id = %event.event_id, "Activation for unknown plan");
                return Ok(());
            };
            if UserRepo::find_by_id(&state.pool, *user_id).await?.is_none() {
                tracing::warn!(user_id, event_id = %event.event_id, "Activation for unknown user");
                return Ok(());
            }
            activate(
                state,
                *user_id,
                &plan,
                event.provider,
                Some(provider_subscription_id.clone()),
                None,
            )
            .await?;
        }

        BillingEventKind::SubscriptionRenewed {
            provider_subscription_id,
            period_start,
            period_end: incoming_end,
        } => {
            let Some(subscription) =
                find_by_ref(state, event, provider_subscription_id).await?
            else {
                return Ok(());
            };
            let now = Utc::now();
            if !renewal_starts_new_period(
                subscription.current_period_start,
                subscription.current_period_end,
                *period_start,
                now,
            ) {
                tracing::debug!(
                    subscription_id = subscription.id,
                    "Renewal notice does not start a new period, skipping"
                );
                return Ok(());
            }

            let Some(plan) = PlanRepo::find_by_id(&state.pool, subscription.plan_id).await? else {
                return Ok(());
            };
            let start = period_start.unwrap_or(subscription.current_period_end.max(now));
            let end = match incoming_end {
                Some(end) => *end,
                None => period_end(start, PlanInterval::parse(&plan.billing_interval)?, 1),
            };
            if SubscriptionRepo::renew(
                &state.pool,
                subscription.id,
                start,
                end,
                i64::from(plan.monthly_nuts),
            )
            .await?
            .is_some()
            {
                tracing::info!(
                    subscription_id = subscription.id,
                    user_id = subscription.user_id,
                    period_end = %end,
                    "Subscription renewed"
                );
            }
        }

        BillingEventKind::PaymentFailed {
            provider_subscription_id,
        } => {
            if let Some(subscription) = find_by_ref(state, event, provider_subscription_id).await? {
                if SubscriptionRepo::mark_past_due(&state.pool, subscription.id)
                    .await?
                    .is_some()
                {
                    tracing::warn!(
                        subscription_id = subscription.id,
                        user_id = subscription.user_id,
                        "Subscription payment failed, now past due"
                    );
                }
            }
        }

        BillingEventKind::SubscriptionCanceled {
            provider_subscription_id,
            at_period_end,
        } => {
            if let Some(subscription) = find_by_ref(state, event, provider_subscription_id).await? {
                let updated = if *at_period_end {
                    SubscriptionRepo::set_cancel_at_period_end(&state.pool, subscription.id, true)
                        .await?
                } else {
                    SubscriptionRepo::cancel_now(&state.pool, subscription.id).await?
                };
                if updated.is_some() {
                    publish_canceled(state, &subscription, *at_period_end);
                }
            }
        }

        BillingEventKind::SubscriptionEnded {
            provider_subscription_id,
        } => {
            if let Some(subscription) = find_by_ref(state, event, provider_subscription_id).await? {
                if SubscriptionRepo::expire(&state.pool, subscription.id)
                    .await?
                    .is_some()
                {
                    publish_expired(state, &subscription);
                }
            }
        }

        BillingEventKind::Ignored => {
            tracing::debug!(
                provider = event.provider.as_str(),
                event_type = %event.event_type,
                "Billing event ignored"
            );
        }
    }
    Ok(())
}

async fn find_by_ref(
    state: &AppState,
    event: &BillingEvent,
    provider_subscription_id: &str,
) -> AppResult<Option<Subscription>> {
    let found = SubscriptionRepo::find_by_provider_ref(
        &state.pool,
        event.provider.as_str(),
        provider_subscription_id,
    )
    .await?;
    if found.is_none() {
        tracing::warn!(
            provider = event.provider.as_str(),
            provider_subscription_id,
            event_type = %event.event_type,
            "Billing event for unknown subscription"
        );
    }
    Ok(found)
}

pub fn publish_canceled(state: &AppState, subscription: &Subscription, at_period_end: bool) {
    state.event_bus.publish(
        PlatformEvent::new(event_types::SUBSCRIPTION_CANCELED)
            .with_source("subscription", subscription.id)
            .with_actor(subscription.user_id)
            .with_payload(serde_json::json!({ "at_period_end": at_period_end })),
    );
}

pub fn publish_expired(state: &AppState, subscription: &Subscription) {
    tracing::info!(
        subscription_id = subscription.id,
        user_id = subscription.user_id,
        "Subscription expired"
    );
    state.event_bus.publish(
        PlatformEvent::new(event_types::SUBSCRIPTION_EXPIRED)
            .with_source("subscription", subscription.id)
            .with_actor(subscription.user_id),
    );
}
