//! Repository for the `subscriptions` table.
//!
//! A user holds at most one `active` subscription (partial unique index).
//! [`SubscriptionRepo::activate`] performs the swap: any current subscription
//! is canceled and the new one inserted in the same transaction.

use muse_core::credits::reasons;
use muse_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::nut_transaction::LedgerRef;
use crate::models::subscription::{ActivateSubscription, Activation, Subscription};
use crate::repositories::CreditRepo;

const COLUMNS: &str = "id, user_id, plan_id, provider, provider_subscription_id, status, \
                       current_period_start, current_period_end, cancel_at_period_end, \
                       canceled_at, created_at, updated_at";

pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Activate a subscription, replacing whatever the user currently holds.
    ///
    /// Replaying an activation for a provider reference that is already
    /// stored returns that row with `created = false` and changes nothing.
    pub async fn activate(
        pool: &PgPool,
        input: &ActivateSubscription,
    ) -> Result<Activation, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Serialize concurrent activations for the same user.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(input.user_id)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(ref provider_ref) = input.provider_subscription_id {
            let query = format!(
                "SELECT {COLUMNS} FROM subscriptions
                 WHERE provider = $1 AND provider_subscription_id = $2"
            );
            let existing = sqlx::query_as::<_, Subscription>(&query)
                .bind(&input.provider)
                .bind(provider_ref)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(subscription) = existing {
                tx.commit().await?;
                return Ok(Activation {
                    subscription,
                    replaced: Vec::new(),
                    created: false,
                });
            }
        }

        let cancel_query = format!(
            "UPDATE subscriptions SET status = 'canceled', canceled_at = NOW()
             WHERE user_id = $1 AND status IN ('active', 'past_due')
             RETURNING {COLUMNS}"
        );
        let replaced = sqlx::query_as::<_, Subscription>(&cancel_query)
            .bind(input.user_id)
            .fetch_all(&mut *tx)
            .await?;

        let insert_query = format!(
            "INSERT INTO subscriptions
                (user_id, plan_id, provider, provider_subscription_id, status,
                 current_period_start, current_period_end)
             VALUES ($1, $2, $3, $4, 'active', $5, $6)
             RETURNING {COLUMNS}"
        );
        let subscription = sqlx::query_as::<_, Subscription>(&insert_query)
            .bind(input.user_id)
            .bind(input.plan_id)
            .bind(&input.provider)
            .bind(&input.provider_subscription_id)
            .bind(input.period_start)
            .bind(input.period_end)
            .fetch_one(&mut *tx)
            .await?;

        if input.grant_nuts > 0 {
            CreditRepo::grant_with(
                &mut tx,
                input.user_id,
                input.grant_nuts,
                reasons::SUBSCRIPTION_GRANT,
                Some(LedgerRef {
                    entity_type: "subscription",
                    entity_id: subscription.id,
                }),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(Activation {
            subscription,
            replaced,
            created: true,
        })
    }

    /// Start a new period: re-activate, move the period window and grant the
    /// plan's nuts.
    pub async fn renew(
        pool: &PgPool,
        id: DbId,
        period_start: Timestamp,
        period_end: Timestamp,
        grant_nuts: i64,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE subscriptions SET
                status = 'active',
                current_period_start = $2,
                current_period_end = $3
             WHERE id = $1 AND status IN ('active', 'past_due')
             RETURNING {COLUMNS}"
        );
        let renewed = sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(period_start)
            .bind(period_end)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(ref subscription) = renewed {
            if grant_nuts > 0 {
                CreditRepo::grant_with(
                    &mut tx,
                    subscription.user_id,
                    grant_nuts,
                    reasons::SUBSCRIPTION_GRANT,
                    Some(LedgerRef {
                        entity_type: "subscription",
                        entity_id: subscription.id,
                    }),
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(renewed)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a subscription by the payment provider's own identifier.
    pub async fn find_by_provider_ref(
        pool: &PgPool,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE provider = $1 AND provider_subscription_id = $2"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(provider)
            .bind(provider_subscription_id)
            .fetch_optional(pool)
            .await
    }

    /// The user's current subscription: active, or past due within grace.
    pub async fn find_current_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE user_id = $1 AND status IN ('active', 'past_due')
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Full subscription history of a user, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Mark an active subscription past due after a failed payment.
    pub async fn mark_past_due(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET status = 'past_due'
             WHERE id = $1 AND status = 'active'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set or clear the cancel-at-period-end flag on a current subscription.
    pub async fn set_cancel_at_period_end(
        pool: &PgPool,
        id: DbId,
        cancel: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET
                cancel_at_period_end = $2,
                canceled_at = CASE WHEN $2 THEN COALESCE(canceled_at, NOW()) ELSE NULL END
             WHERE id = $1 AND status IN ('active', 'past_due')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(cancel)
            .fetch_optional(pool)
            .await
    }

    /// End a current subscription immediately.
    pub async fn cancel_now(pool: &PgPool, id: DbId) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET status = 'canceled', canceled_at = COALESCE(canceled_at, NOW())
             WHERE id = $1 AND status IN ('active', 'past_due', 'pending')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a current subscription expired.
    pub async fn expire(pool: &PgPool, id: DbId) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET status = 'expired'
             WHERE id = $1 AND status IN ('active', 'past_due')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current subscriptions whose period ended at or before `now`.
    ///
    /// Callers decide per row whether it actually expires.
    pub async fn list_period_ended(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE status IN ('active', 'past_due') AND current_period_end <= $1
             ORDER BY current_period_end"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Number of active subscriptions platform-wide.
    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE status = 'active'")
            .fetch_one(pool)
            .await
    }
}
