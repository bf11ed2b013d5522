//! Repository for one-time `auth_tokens` (email verification, password reset).

use muse_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::auth_token::AuthToken;

const COLUMNS: &str = "id, user_id, purpose, token_hash, expires_at, consumed_at, created_at";

pub struct AuthTokenRepo;

impl AuthTokenRepo {
    /// Store a new token hash.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        purpose: &str,
        token_hash: &str,
        expires_at: Timestamp,
    ) -> Result<AuthToken, sqlx::Error> {
        let query = format!(
            "INSERT INTO auth_tokens (user_id, purpose, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuthToken>(&query)
            .bind(user_id)
            .bind(purpose)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(pool)
            .await
    }

    /// Atomically consume an unexpired, unconsumed token.
    ///
    /// Returns `None` when the token is unknown, expired, already used, or
    /// issued for another purpose.
    pub async fn consume(
        pool: &PgPool,
        purpose: &str,
        token_hash: &str,
    ) -> Result<Option<AuthToken>, sqlx::Error> {
        let query = format!(
            "UPDATE auth_tokens SET consumed_at = NOW()
             WHERE token_hash = $1
               AND purpose = $2
               AND consumed_at IS NULL
               AND expires_at > NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuthToken>(&query)
            .bind(token_hash)
            .bind(purpose)
            .fetch_optional(pool)
            .await
    }

    /// Invalidate all outstanding tokens of one purpose for a user.
    pub async fn invalidate_for_user(
        pool: &PgPool,
        user_id: DbId,
        purpose: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET consumed_at = NOW()
             WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL",
        )
        .bind(user_id)
        .bind(purpose)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
