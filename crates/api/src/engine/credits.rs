//! Nut charges and refunds.

use muse_core::credits::{effective_limits, Charge, DailyLimits, UsageKind};
use muse_core::error::CoreError;
use muse_core::types::{DbId, Timestamp};
use muse_db::models::nut_transaction::{ChargeOutcome, LedgerRef};
use muse_db::repositories::{CreditRepo, PlanRepo, SubscriptionRepo};

use crate::error::AppResult;
use crate::state::AppState;

/// Daily limits for `user_id`: the current plan's, or the free tier's.
///
/// A past-due subscription keeps its plan limits during the grace period.
pub async fn limits_for(state: &AppState, user_id: DbId) -> AppResult<DailyLimits> {
    let plan_limits = match SubscriptionRepo::find_current_for_user(&state.pool, user_id).await? {
        Some(subscription) => PlanRepo::find_by_id(&state.pool, subscription.plan_id)
            .await?
            .map(|plan| plan.daily_limits()),
        None => None,
    };
    Ok(effective_limits(plan_limits, state.config.credits.free_limits))
}

/// Count one use of `kind` and take `cost` nuts.
///
/// Returns the balance after the charge. A full daily counter is a 429, a
/// short balance a 402; neither writes anything.
pub async fn charge(
    state: &AppState,
    user_id: DbId,
    kind: UsageKind,
    cost: i64,
    reason: &'static str,
) -> AppResult<i64> {
    let limits = limits_for(state, user_id).await?;
    let charge = Charge {
        kind,
        cost,
        daily_limit: limits.limit_for(kind),
        reason,
    };

    match CreditRepo::charge(&state.pool, user_id, &charge, None).await? {
        ChargeOutcome::Charged { balance_after } => {
            tracing::debug!(user_id, kind = kind.as_str(), cost, balance_after, "Charged");
            Ok(balance_after)
        }
        ChargeOutcome::LimitReached { limit } => Err(CoreError::DailyLimitReached {
            resource: kind.as_str(),
            limit,
        }
        .into()),
        ChargeOutcome::InsufficientNuts { available } => Err(CoreError::InsufficientNuts {
            required: cost,
            available,
        }
        .into()),
    }
}

/// Give back a charge and release its usage slot.
///
/// `charged_at` is when the charge was made (a job's `created_at`); `None`
/// means today. `reference` names the failed job, when one was created. Errors are logged
/// rather than returned.
pub async fn refund(
    state: &AppState,
    user_id: DbId,
    kind: UsageKind,
    amount: i64,
    charged_at: Option<Timestamp>,
    reference: Option<LedgerRef<'_>>,
) {
    let entity_id = reference.map(|r| r.entity_id);
    match CreditRepo::refund(&state.pool, user_id, kind, amount, charged_at, reference).await {
        Ok(balance) => {
            tracing::info!(user_id, entity_id, amount, balance, "Charge refunded");
        }
        Err(e) => {
            tracing::error!(
                user_id,
                entity_id,
                amount,
                error = %e,
                "Failed to refund charge"
            );
        }
    }
}
