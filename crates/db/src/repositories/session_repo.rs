//! Repository for `refresh_sessions`.

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::session::{NewRefreshSession, RefreshSession};

const COLUMNS: &str =
    "id, user_id, token_hash, expires_at, revoked_at, replaced_by, user_agent, created_at";

/// Longest user agent kept on a session.
const MAX_USER_AGENT_LEN: usize = 255;

pub struct SessionRepo;

impl SessionRepo {
    /// Store a session. When it rotates out an older one, the older row is
    /// pointed at the new id in the same transaction.
    pub async fn create(
        pool: &PgPool,
        input: &NewRefreshSession<'_>,
    ) -> Result<RefreshSession, sqlx::Error> {
        let user_agent = input
            .user_agent
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>());

        let mut tx = pool.begin().await?;
        let query = format!(
            "INSERT INTO refresh_sessions (user_id, token_hash, expires_at, user_agent)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let session = sqlx::query_as::<_, RefreshSession>(&query)
            .bind(input.user_id)
            .bind(input.token_hash)
            .bind(input.expires_at)
            .bind(user_agent)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(previous) = input.rotated_from {
            sqlx::query("UPDATE refresh_sessions SET replaced_by = $2 WHERE id = $1")
                .bind(previous)
                .bind(session.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(session)
    }

    /// Spend a live refresh token. Two concurrent refreshes with the same
    /// token cannot both succeed: only one `UPDATE` matches.
    pub async fn consume(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let query = format!(
            "UPDATE refresh_sessions SET revoked_at = NOW()
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Revoke every live session of a user. Returns how many were revoked.
    pub async fn revoke_all_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = NOW()
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Live sessions of a user, newest first.
    pub async fn list_live_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<RefreshSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM refresh_sessions
             WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
