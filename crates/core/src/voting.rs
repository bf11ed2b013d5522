//! Image vote tally rules.
//!
//! A user holds at most one vote per image. Repeating the same vote removes
//! it; voting the other way switches it.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    /// Value stored in `image_votes.vote_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "up" => Ok(VoteType::Up),
            "down" => Ok(VoteType::Down),
            other => Err(CoreError::Validation(format!(
                "Invalid vote type '{other}'. Must be one of: up, down"
            ))),
        }
    }
}

/// What a vote request does to the stored row and the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    /// The user's vote after the change (`None` = removed).
    pub resulting: Option<VoteType>,
    pub upvote_delta: i32,
    pub downvote_delta: i32,
}

/// Compute the effect of voting `requested` when `existing` is stored.
pub fn apply_vote(existing: Option<VoteType>, requested: VoteType) -> VoteChange {
    let delta = |v: VoteType, n: i32| match v {
        VoteType::Up => (n, 0),
        VoteType::Down => (0, n),
    };

    let (resulting, (up, down)) = match existing {
        None => (Some(requested), delta(requested, 1)),
        Some(current) if current == requested => (None, delta(requested, -1)),
        Some(current) => {
            let (u1, d1) = delta(current, -1);
            let (u2, d2) = delta(requested, 1);
            (Some(requested), (u1 + u2, d1 + d2))
        }
    };

    VoteChange {
        resulting,
        upvote_delta: up,
        downvote_delta: down,
    }
}

/// Apply a delta to a possibly-NULL counter, never dropping below zero.
pub fn adjust_counter(current: Option<i32>, delta: i32) -> i32 {
    (current.unwrap_or(0) + delta).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vote_is_recorded() {
        let change = apply_vote(None, VoteType::Up);
        assert_eq!(change.resulting, Some(VoteType::Up));
        assert_eq!((change.upvote_delta, change.downvote_delta), (1, 0));
    }

    #[test]
    fn same_vote_twice_removes_it() {
        let change = apply_vote(Some(VoteType::Down), VoteType::Down);
        assert_eq!(change.resulting, None);
        assert_eq!((change.upvote_delta, change.downvote_delta), (0, -1));
    }

    #[test]
    fn opposite_vote_switches() {
        let change = apply_vote(Some(VoteType::Up), VoteType::Down);
        assert_eq!(change.resulting, Some(VoteType::Down));
        assert_eq!((change.upvote_delta, change.downvote_delta), (-1, 1));
    }

    #[test]
    fn counters_coalesce_null_and_floor_at_zero() {
        assert_eq!(adjust_counter(None, 1), 1);
        assert_eq!(adjust_counter(None, -1), 0);
        assert_eq!(adjust_counter(Some(3), -1), 2);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(VoteType::parse("up").unwrap(), VoteType::Up);
        assert!(VoteType::parse("sideways").is_err());
    }
}
