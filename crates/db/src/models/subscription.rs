//! Subscription model and DTOs.

use muse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: DbId,
    pub user_id: DbId,
    pub plan_id: DbId,
    pub provider: String,
    pub provider_subscription_id: Option<String>,
    pub status: String,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for activating a new subscription.
#[derive(Debug, Clone)]
pub struct ActivateSubscription {
    pub user_id: DbId,
    pub plan_id: DbId,
    pub provider: String,
    pub provider_subscription_id: Option<String>,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    /// Nuts credited to the user as part of the activation.
    pub grant_nuts: i64,
}

/// Result of an activation: the new row plus any subscriptions it replaced.
#[derive(Debug, Clone)]
pub struct Activation {
    pub subscription: Subscription,
    pub replaced: Vec<Subscription>,
    /// `false` when the provider reference was already active (replayed event).
    pub created: bool,
}
