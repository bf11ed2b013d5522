//! Subscription vocabulary and billing period arithmetic.

use chrono::Months;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Days a past-due subscription keeps its benefits before expiring.
pub const PAST_DUE_GRACE_DAYS: i64 = 7;

/// Billing interval of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Month,
    Year,
}

impl PlanInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanInterval::Month => "month",
            PlanInterval::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "month" => Ok(PlanInterval::Month),
            "year" => Ok(PlanInterval::Year),
            other => Err(CoreError::Validation(format!(
                "Invalid interval '{other}'. Must be one of: month, year"
            ))),
        }
    }

    /// Length of one interval in calendar months.
    pub fn months(self) -> u32 {
        match self {
            PlanInterval::Month => 1,
            PlanInterval::Year => 12,
        }
    }
}

/// Lifecycle status of a subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    PastDue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

/// Who bills a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    Paypal,
    Manual,
}

impl PaymentProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProviderKind::Stripe => "stripe",
            PaymentProviderKind::Paypal => "paypal",
            PaymentProviderKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "stripe" => Ok(PaymentProviderKind::Stripe),
            "paypal" => Ok(PaymentProviderKind::Paypal),
            "manual" => Ok(PaymentProviderKind::Manual),
            other => Err(CoreError::Validation(format!(
                "Invalid payment provider '{other}'. Must be one of: stripe, paypal"
            ))),
        }
    }
}

/// End of a billing period that starts at `start` and spans `count` intervals.
///
/// Calendar arithmetic: Jan 31 + 1 month = Feb 28/29.
pub fn period_end(start: Timestamp, interval: PlanInterval, count: u32) -> Timestamp {
    let months = interval.months().saturating_mul(count.max(1));
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(start + chrono::Duration::days(30 * i64::from(months)))
}

/// Whether an active or past-due subscription should be expired now.
///
/// Active rows expire once their period ended, but only when they were set to
/// cancel or are manual grants (provider renewals extend the period instead).
/// Past-due rows expire after the grace period.
pub fn should_expire(
    status: SubscriptionStatus,
    provider: PaymentProviderKind,
    cancel_at_period_end: bool,
    period_end: Timestamp,
    now: Timestamp,
) -> bool {
    match status {
        SubscriptionStatus::Active => {
            period_end <= now && (cancel_at_period_end || provider == PaymentProviderKind::Manual)
        }
        SubscriptionStatus::PastDue => {
            period_end + chrono::Duration::days(PAST_DUE_GRACE_DAYS) <= now
        }
        _ => false,
    }
}

/// A renewal notice without explicit dates only counts once the current
/// period is this close to ending.
pub const RENEWAL_WINDOW_DAYS: i64 = 3;

/// Whether a renewal notice starts a new billing period.
///
/// With an explicit start, the notice must begin after the current period's
/// start (replays and the first invoice of a subscription do not). Without
/// one, the current period must be within [`RENEWAL_WINDOW_DAYS`] of ending.
pub fn renewal_starts_new_period(
    current_start: Timestamp,
    current_end: Timestamp,
    incoming_start: Option<Timestamp>,
    now: Timestamp,
) -> bool {
    match incoming_start {
        Some(start) => start > current_start,
        None => now + chrono::Duration::days(RENEWAL_WINDOW_DAYS) >= current_end,
    }
}
