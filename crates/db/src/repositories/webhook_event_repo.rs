//! Idempotency ledger for payment provider webhooks.

use sqlx::PgPool;

pub struct WebhookEventRepo;

impl WebhookEventRepo {
    /// Record a provider event. Returns `false` when it was already recorded.
    pub async fn record_once(
        pool: &PgPool,
        provider: &str,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO billing_webhook_events (provider, event_id, event_type)
             VALUES ($1, $2, $3)
             ON CONFLICT (provider, event_id) DO NOTHING",
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a recorded event so a redelivery is processed again.
    pub async fn forget(pool: &PgPool, provider: &str, event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM billing_webhook_events WHERE provider = $1 AND event_id = $2")
            .bind(provider)
            .bind(event_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
