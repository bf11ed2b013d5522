//! Hourly expiry of subscriptions whose paid period is over.

use std::time::Duration;

use chrono::Utc;
use muse_core::billing::{should_expire, PaymentProviderKind, SubscriptionStatus};
use muse_db::repositories::SubscriptionRepo;
use tokio_util::sync::CancellationToken;

use crate::engine::subscriptions;
use crate::state::AppState;

/// How often the expiry job runs.
const EXPIRY_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the expiry loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = EXPIRY_INTERVAL.as_secs(),
        "Subscription expiry job started"
    );

    let mut interval = tokio::time::interval(EXPIRY_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Subscription expiry job stopping");
                break;
            }
            _ = interval.tick() => {
                match expire_due(&state).await {
                    Ok(0) => tracing::debug!("Subscription expiry: nothing expired"),
                    Ok(expired) => tracing::info!(expired, "Subscription expiry: expired subscriptions"),
                    Err(e) => tracing::error!(error = %e, "Subscription expiry: run failed"),
                }
            }
        }
    }
}

/// Expire every current subscription that is due. Returns how many were
/// expired.
pub async fn expire_due(state: &AppState) -> Result<usize, sqlx::Error> {
    let now = Utc::now();
    let candidates = SubscriptionRepo::list_period_ended(&state.pool, now).await?;

    let mut expired = 0;
    for subscription in candidates {
        let Some(status) = SubscriptionStatus::parse(&subscription.status) else {
            continue;
        };
        let provider =
            PaymentProviderKind::parse(&subscription.provider).unwrap_or(PaymentProviderKind::Manual);

        if !should_expire(
            status,
            provider,
            subscription.cancel_at_period_end,
            subscription.current_period_end,
            now,
        ) {
            continue;
        }

        if let Some(row) = SubscriptionRepo::expire(&state.pool, subscription.id).await? {
            subscriptions::publish_expired(state, &row);
            expired += 1;
        }
    }
    Ok(expired)
}
