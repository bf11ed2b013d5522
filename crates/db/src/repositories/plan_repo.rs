//! Repository for the `plans` table.

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::plan::{CreatePlan, Plan, UpdatePlan};

const COLUMNS: &str = "id, code, name, description, price_cents, currency, billing_interval, \
                       monthly_nuts, daily_image_limit, daily_video_limit, daily_message_limit, \
                       stripe_price_id, paypal_plan_id, is_active, sort_order, created_at, updated_at";

/// Subscription plans.
pub struct PlanRepo;

impl PlanRepo {
    /// Insert a new plan, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreatePlan) -> Result<Plan, sqlx::Error> {
        let query = format!(
            "INSERT INTO plans
                (code, name, description, price_cents, currency, billing_interval, monthly_nuts,
                 daily_image_limit, daily_video_limit, daily_message_limit,
                 stripe_price_id, paypal_plan_id, sort_order)
             VALUES ($1, $2, $3, $4, COALESCE($5, 'usd'), COALESCE($6, 'month'), COALESCE($7, 0),
                     $8, $9, $10, $11, $12, COALESCE($13, 0))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Plan>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(&input.currency)
            .bind(&input.billing_interval)
            .bind(input.monthly_nuts)
            .bind(input.daily_image_limit)
            .bind(input.daily_video_limit)
            .bind(input.daily_message_limit)
            .bind(&input.stripe_price_id)
            .bind(&input.paypal_plan_id)
            .bind(input.sort_order)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Plan>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM plans WHERE id = $1");
        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Plan>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM plans WHERE code = $1");
        sqlx::query_as::<_, Plan>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// Active plans in display order.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM plans WHERE is_active = true ORDER BY sort_order, price_cents, id"
        );
        sqlx::query_as::<_, Plan>(&query).fetch_all(pool).await
    }

    /// Every plan, including retired ones.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM plans ORDER BY sort_order, price_cents, id");
        sqlx::query_as::<_, Plan>(&query).fetch_all(pool).await
    }

    /// Update a plan. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdatePlan,
    ) -> Result<Option<Plan>, sqlx::Error> {
        let query = format!(
            "UPDATE plans SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                monthly_nuts = COALESCE($5, monthly_nuts),
                daily_image_limit = COALESCE($6, daily_image_limit),
                daily_video_limit = COALESCE($7, daily_video_limit),
                daily_message_limit = COALESCE($8, daily_message_limit),
                stripe_price_id = COALESCE($9, stripe_price_id),
                paypal_plan_id = COALESCE($10, paypal_plan_id),
                is_active = COALESCE($11, is_active),
                sort_order = COALESCE($12, sort_order)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(input.monthly_nuts)
            .bind(input.daily_image_limit)
            .bind(input.daily_video_limit)
            .bind(input.daily_message_limit)
            .bind(&input.stripe_price_id)
            .bind(&input.paypal_plan_id)
            .bind(input.is_active)
            .bind(input.sort_order)
            .fetch_optional(pool)
            .await
    }
}
