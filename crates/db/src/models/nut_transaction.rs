//! Nut ledger and daily usage models.

use muse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `nut_transactions` ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NutTransaction {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: i64,
    pub reason: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<DbId>,
    pub balance_after: i64,
    pub created_at: Timestamp,
}

/// Reference to the entity a ledger row pays for.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRef<'a> {
    pub entity_type: &'a str,
    pub entity_id: DbId,
}

/// Today's count for one usage kind.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageCount {
    pub kind: String,
    pub count: i32,
}

/// Outcome of an attempted charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Counter bumped and nuts deducted.
    Charged { balance_after: i64 },
    /// The daily limit for the usage kind is exhausted.
    LimitReached { limit: i32 },
    /// The balance does not cover the cost.
    InsufficientNuts { available: i64 },
}
