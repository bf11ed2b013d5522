//! Nut balance, ledger and daily usage counters.
//!
//! Every balance change writes a `nut_transactions` row with the balance
//! after the change. Charges bump the daily usage counter and deduct nuts in
//! a single transaction so a request either pays fully or not at all.

use muse_core::credits::{reasons, Charge, UsageKind};
use muse_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::nut_transaction::{ChargeOutcome, LedgerRef, NutTransaction, UsageCount};

const COLUMNS: &str =
    "id, user_id, amount, reason, reference_type, reference_id, balance_after, created_at";

pub struct CreditRepo;

impl CreditRepo {
    /// Count one use of `charge.kind` for today and deduct `charge.cost` nuts.
    ///
    /// The counter only moves while below `charge.daily_limit`, and the
    /// deduction only happens while the balance covers the cost. Nothing is
    /// written when either check fails.
    pub async fn charge(
        pool: &PgPool,
        user_id: DbId,
        charge: &Charge,
        reference: Option<LedgerRef<'_>>,
    ) -> Result<ChargeOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        match charge.daily_limit {
            Some(limit) if limit <= 0 => return Ok(ChargeOutcome::LimitReached { limit }),
            Some(limit) => {
                let counted: Option<i32> = sqlx::query_scalar(
                    "INSERT INTO usage_counters (user_id, kind, usage_date, count)
                     VALUES ($1, $2, CURRENT_DATE, 1)
                     ON CONFLICT (user_id, kind, usage_date)
                     DO UPDATE SET count = usage_counters.count + 1
                     WHERE usage_counters.count < $3
                     RETURNING count",
                )
                .bind(user_id)
                .bind(charge.kind.as_str())
                .bind(limit)
                .fetch_optional(&mut *tx)
                .await?;
                if counted.is_none() {
                    return Ok(ChargeOutcome::LimitReached { limit });
                }
            }
            None => {
                sqlx::query(
                    "INSERT INTO usage_counters (user_id, kind, usage_date, count)
                     VALUES ($1, $2, CURRENT_DATE, 1)
                     ON CONFLICT (user_id, kind, usage_date)
                     DO UPDATE SET count = usage_counters.count + 1",
                )
                .bind(user_id)
                .bind(charge.kind.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        let balance_after = if charge.cost > 0 {
            let deducted: Option<i64> = sqlx::query_scalar(
                "UPDATE users SET nuts = nuts - $2
                 WHERE id = $1 AND nuts >= $2
                 RETURNING nuts",
            )
            .bind(user_id)
            .bind(charge.cost)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(balance) = deducted else {
                let available: i64 = sqlx::query_scalar("SELECT nuts FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
                return Ok(ChargeOutcome::InsufficientNuts { available });
            };

            insert_ledger(&mut tx, user_id, -charge.cost, charge.reason, reference, balance)
                .await?;
            balance
        } else {
            sqlx::query_scalar("SELECT nuts FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;
        Ok(ChargeOutcome::Charged { balance_after })
    }

    /// Give back a charge for a failed job: credit the nuts and release the
    /// usage slot of the day the charge was made (`charged_at`, or today when
    /// `None`). Returns the new balance.
    pub async fn refund(
        pool: &PgPool,
        user_id: DbId,
        kind: UsageKind,
        amount: i64,
        charged_at: Option<Timestamp>,
        reference: Option<LedgerRef<'_>>,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE usage_counters SET count = GREATEST(count - 1, 0)
             WHERE user_id = $1 AND kind = $2
               AND usage_date = COALESCE($3::timestamptz, NOW())::date",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(charged_at)
        .execute(&mut *tx)
        .await?;

        let balance = if amount > 0 {
            Self::grant_with(&mut tx, user_id, amount, reasons::REFUND, reference).await?
        } else {
            sqlx::query_scalar("SELECT nuts FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;
        Ok(balance)
    }

    /// Credit `amount` nuts with a ledger entry. Returns the new balance.
    pub async fn grant(
        pool: &PgPool,
        user_id: DbId,
        amount: i64,
        reason: &str,
        reference: Option<LedgerRef<'_>>,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let balance = Self::grant_with(&mut tx, user_id, amount, reason, reference).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// [`grant`](Self::grant) on a connection the caller already holds,
    /// typically inside a larger transaction.
    pub async fn grant_with(
        conn: &mut PgConnection,
        user_id: DbId,
        amount: i64,
        reason: &str,
        reference: Option<LedgerRef<'_>>,
    ) -> Result<i64, sqlx::Error> {
        let balance: i64 =
            sqlx::query_scalar("UPDATE users SET nuts = nuts + $2 WHERE id = $1 RETURNING nuts")
                .bind(user_id)
                .bind(amount)
                .fetch_one(&mut *conn)
                .await?;
        insert_ledger(conn, user_id, amount, reason, reference, balance).await?;
        Ok(balance)
    }

    /// Apply a signed adjustment. Returns `None` when it would make the
    /// balance negative (or the user does not exist); nothing is written then.
    pub async fn adjust(
        pool: &PgPool,
        user_id: DbId,
        delta: i64,
        reason: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET nuts = nuts + $2
             WHERE id = $1 AND nuts + $2 >= 0
             RETURNING nuts",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            return Ok(None);
        };
        insert_ledger(&mut tx, user_id, delta, reason, None, balance).await?;

        tx.commit().await?;
        Ok(Some(balance))
    }

    /// A user's ledger, newest first.
    pub async fn list_transactions(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NutTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM nut_transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, NutTransaction>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Number of ledger rows for a user.
    pub async fn count_transactions(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM nut_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Today's usage counters for a user.
    pub async fn usage_today(pool: &PgPool, user_id: DbId) -> Result<Vec<UsageCount>, sqlx::Error> {
        sqlx::query_as::<_, UsageCount>(
            "SELECT kind, count FROM usage_counters
             WHERE user_id = $1 AND usage_date = CURRENT_DATE
             ORDER BY kind",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Total nuts spent platform-wide today (sum of negative ledger amounts).
    pub async fn spent_today(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(-SUM(amount), 0)::BIGINT FROM nut_transactions
             WHERE amount < 0 AND created_at >= CURRENT_DATE",
        )
        .fetch_one(pool)
        .await
    }
}

async fn insert_ledger(
    conn: &mut PgConnection,
    user_id: DbId,
    amount: i64,
    reason: &str,
    reference: Option<LedgerRef<'_>>,
    balance_after: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO nut_transactions
            (user_id, amount, reason, reference_type, reference_id, balance_after)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .bind(reference.map(|r| r.entity_type))
    .bind(reference.map(|r| r.entity_id))
    .bind(balance_after)
    .execute(conn)
    .await?;
    Ok(())
}
