//! Nut costs, daily usage limits, and ledger reason codes.

use serde::Serialize;

/// Kinds of usage counted against a daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Image,
    Video,
    Message,
    Speech,
}

impl UsageKind {
    /// Value stored in `usage_counters.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            UsageKind::Image => "image",
            UsageKind::Video => "video",
            UsageKind::Message => "message",
            UsageKind::Speech => "speech",
        }
    }
}

/// Per-day caps. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyLimits {
    pub images: Option<i32>,
    pub videos: Option<i32>,
    pub messages: Option<i32>,
}

impl DailyLimits {
    /// The cap that applies to `kind`. Speech is never capped per day.
    pub fn limit_for(&self, kind: UsageKind) -> Option<i32> {
        match kind {
            UsageKind::Image => self.images,
            UsageKind::Video => self.videos,
            UsageKind::Message => self.messages,
            UsageKind::Speech => None,
        }
    }
}

/// Nut price of each billable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditCosts {
    pub image: i64,
    pub upscale: i64,
    pub video: i64,
    pub avatar_video: i64,
    pub speech: i64,
}

impl Default for CreditCosts {
    fn default() -> Self {
        Self {
            image: 1,
            upscale: 1,
            video: 5,
            avatar_video: 5,
            speech: 1,
        }
    }
}

/// A billable charge: which counter to bump and how many nuts to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub kind: UsageKind,
    pub cost: i64,
    pub daily_limit: Option<i32>,
    pub reason: &'static str,
}

/// Ledger reason codes (`nut_transactions.reason`).
pub mod reasons {
    pub const SIGNUP_BONUS: &str = "signup_bonus";
    pub const IMAGE_GENERATION: &str = "image_generation";
    pub const IMAGE_UPSCALE: &str = "image_upscale";
    pub const VIDEO_GENERATION: &str = "video_generation";
    pub const AVATAR_VIDEO: &str = "avatar_video";
    pub const SPEECH: &str = "speech";
    pub const CHAT_MESSAGE: &str = "chat_message";
    pub const REFUND: &str = "refund";
    pub const SUBSCRIPTION_GRANT: &str = "subscription_grant";
    pub const ADMIN_ADJUSTMENT: &str = "admin_adjustment";
}

/// Pick the limits that apply: the active plan's, or the free tier's.
pub fn effective_limits(plan: Option<DailyLimits>, free: DailyLimits) -> DailyLimits {
    plan.unwrap_or(free)
}

/// How many uses remain today, or `None` when unlimited.
pub fn remaining(limit: Option<i32>, used: i32) -> Option<i32> {
    limit.map(|l| (l - used).max(0))
}
