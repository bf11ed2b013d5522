//! Moderation states for user-published media.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// Not published; never shown in the gallery.
    Private,
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationStatus::Private => "private",
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "private" => Ok(ModerationStatus::Private),
            "pending" => Ok(ModerationStatus::Pending),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            other => Err(CoreError::Validation(format!(
                "Invalid moderation status '{other}'"
            ))),
        }
    }
}

/// A moderator's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn resulting_status(self) -> ModerationStatus {
        match self {
            ModerationAction::Approve => ModerationStatus::Approved,
            ModerationAction::Reject => ModerationStatus::Rejected,
        }
    }
}

/// Moderation status after the owner toggles `is_public`.
///
/// Publishing sends unreviewed media to the queue but keeps an earlier
/// approval; rejected media goes back to the queue for another look.
/// Un-publishing always makes the media private.
pub fn status_after_visibility_change(
    current: ModerationStatus,
    is_public: bool,
) -> ModerationStatus {
    if !is_public {
        return ModerationStatus::Private;
    }
    match current {
        ModerationStatus::Approved => ModerationStatus::Approved,
        _ => ModerationStatus::Pending,
    }
}
