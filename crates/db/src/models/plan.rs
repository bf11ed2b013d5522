//! Subscription plan model and DTOs.

use muse_core::credits::DailyLimits;
use muse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `plans` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plan {
    pub id: DbId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    pub currency: String,
    pub billing_interval: String,
    pub monthly_nuts: i32,
    pub daily_image_limit: Option<i32>,
    pub daily_video_limit: Option<i32>,
    pub daily_message_limit: Option<i32>,
    #[serde(skip_serializing)]
    pub stripe_price_id: Option<String>,
    #[serde(skip_serializing)]
    pub paypal_plan_id: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Plan {
    /// Daily caps granted by this plan.
    pub fn daily_limits(&self) -> DailyLimits {
        DailyLimits {
            images: self.daily_image_limit,
            videos: self.daily_video_limit,
            messages: self.daily_message_limit,
        }
    }
}

/// DTO for creating a plan.
#[derive(Debug, Deserialize)]
pub struct CreatePlan {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    pub currency: Option<String>,
    pub billing_interval: Option<String>,
    pub monthly_nuts: Option<i32>,
    pub daily_image_limit: Option<i32>,
    pub daily_video_limit: Option<i32>,
    pub daily_message_limit: Option<i32>,
    pub stripe_price_id: Option<String>,
    pub paypal_plan_id: Option<String>,
    pub sort_order: Option<i32>,
}

/// DTO for updating a plan. All fields are optional.
///
/// Daily limits cannot be reset to unlimited through this DTO; use a large
/// value instead.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i32>,
    pub monthly_nuts: Option<i32>,
    pub daily_image_limit: Option<i32>,
    pub daily_video_limit: Option<i32>,
    pub daily_message_limit: Option<i32>,
    pub stripe_price_id: Option<String>,
    pub paypal_plan_id: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}
