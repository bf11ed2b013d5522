//! Handlers for plans, checkout and the caller's subscription.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use muse_billing::{CheckoutRequest, CheckoutSession, PaymentProvider};
use muse_core::billing::PaymentProviderKind;
use muse_core::error::CoreError;
use muse_core::types::DbId;
use muse_db::models::plan::Plan;
use muse_db::repositories::{PlanRepo, SubscriptionRepo, UserRepo};
use serde::Deserialize;

use crate::engine::subscriptions::publish_canceled;
use crate::error::{AppError, AppResult};
use crate::handlers::account::CurrentSubscription;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub plan_id: DbId,
    /// `stripe` or `paypal`.
    pub provider: String,
}

/// GET /api/v1/plans
pub async fn list_plans(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<Plan>>>> {
    let plans = PlanRepo::list_active(&state.pool).await?;
    Ok(Json(DataResponse { data: plans }))
}

/// POST /api/v1/subscriptions/checkout
///
/// Open a hosted checkout for `plan_id`. The subscription becomes active
/// when the provider's webhook confirms payment.
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<CheckoutBody>,
) -> AppResult<Json<DataResponse<CheckoutSession>>> {
    let kind = PaymentProviderKind::parse(&input.provider)?;
    let provider = configured_provider(&state, kind)?;

    let plan = PlanRepo::find_by_id(&state.pool, input.plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::not_found("Plan", input.plan_id))?;
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;

    if let Some(current) = SubscriptionRepo::find_current_for_user(&state.pool, user.id).await? {
        if current.plan_id == plan.id && !current.cancel_at_period_end {
            return Err(CoreError::Conflict("You are already subscribed to this plan".into()).into());
        }
    }

    let base = state.config.app_base_url.trim_end_matches('/');
    let session = provider
        .create_checkout(&CheckoutRequest {
            user_id: user.id,
            user_email: user.email.clone(),
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            stripe_price_id: plan.stripe_price_id.clone(),
            paypal_plan_id: plan.paypal_plan_id.clone(),
            success_url: format!("{base}/billing/success"),
            cancel_url: format!("{base}/billing/cancel"),
        })
        .await?;

    tracing::info!(
        user_id = user.id,
        plan = %plan.code,
        provider = kind.as_str(),
        session_id = %session.session_id,
        "Checkout started"
    );
    Ok(Json(DataResponse { data: session }))
}

/// GET /api/v1/subscriptions/current
///
/// `data` is `null` for users on the free tier.
pub async fn current_subscription(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<Option<CurrentSubscription>>>> {
    let current = match SubscriptionRepo::find_current_for_user(&state.pool, auth_user.user_id).await? {
        Some(subscription) => {
            let plan = PlanRepo::find_by_id(&state.pool, subscription.plan_id).await?;
            Some(CurrentSubscription { subscription, plan })
        }
        None => None,
    };
    Ok(Json(DataResponse { data: current }))
}

/// POST /api/v1/subscriptions/cancel
///
/// Cancel at the end of the paid period. Access and limits stay until then.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<CurrentSubscription>>> {
    let subscription = SubscriptionRepo::find_current_for_user(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("You have no active subscription".into()))?;

    let subscription = if subscription.cancel_at_period_end {
        subscription
    } else {
        let kind = PaymentProviderKind::parse(&subscription.provider)?;
        if kind != PaymentProviderKind::Manual {
            if let Some(reference) = subscription.provider_subscription_id.as_deref() {
                configured_provider(&state, kind)?
                    .cancel_subscription(reference, true)
                    .await?;
            }
        }

        let updated = SubscriptionRepo::set_cancel_at_period_end(&state.pool, subscription.id, true)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription", subscription.id))?;
        tracing::info!(
            subscription_id = updated.id,
            user_id = updated.user_id,
            period_end = %updated.current_period_end,
            "Subscription set to cancel at period end"
        );
        publish_canceled(&state, &updated, true);
        updated
    };

    let plan = PlanRepo::find_by_id(&state.pool, subscription.plan_id).await?;
    Ok(Json(DataResponse {
        data: CurrentSubscription { subscription, plan },
    }))
}

fn configured_provider(
    state: &AppState,
    kind: PaymentProviderKind,
) -> AppResult<Arc<dyn PaymentProvider>> {
    if kind == PaymentProviderKind::Manual {
        return Err(AppError::BadRequest(
            "Manual subscriptions are granted by an admin".into(),
        ));
    }
    state.payments.get(kind).ok_or_else(|| {
        AppError::BadRequest(format!("{} payments are not available", kind.as_str()))
    })
}
