//! Domain errors shared by every Muse crate.
//!
//! Each variant carries a stable machine-readable [`CoreError::code`] that
//! the HTTP layer copies into the `code` field of error bodies.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// The nut balance does not cover the cost of the operation.
    #[error("Insufficient nuts: {required} required, {available} available")]
    InsufficientNuts { required: i64, available: i64 },

    /// Today's allowance for `resource` (`"image"`, `"message"`, ...) is used up.
    #[error("Daily {resource} limit of {limit} reached")]
    DailyLimitReached { resource: &'static str, limit: i32 },

    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InsufficientNuts { .. } => "INSUFFICIENT_NUTS",
            Self::DailyLimitReached { .. } => "DAILY_LIMIT_REACHED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to the caller as-is.
    pub fn is_public(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_message_names_the_resource() {
        let err = CoreError::DailyLimitReached {
            resource: "video",
            limit: 3,
        };
        assert_eq!(err.to_string(), "Daily video limit of 3 reached");
        assert_eq!(err.code(), "DAILY_LIMIT_REACHED");
    }

    #[test]
    fn internal_details_stay_private() {
        assert!(!CoreError::Internal("pool timed out".into()).is_public());
        assert!(CoreError::Conflict("taken".into()).is_public());
    }
}
