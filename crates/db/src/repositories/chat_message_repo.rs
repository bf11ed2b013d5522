//! Repository for `chat_messages`: one conversation per (user, companion).

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::chat_message::ChatMessage;

const COLUMNS: &str = "id, user_id, character_id, role, content, audio_url, video_id, created_at";

pub struct ChatMessageRepo;

impl ChatMessageRepo {
    /// Append one message to a conversation.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        character_id: DbId,
        role: &str,
        content: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        let query = format!(
            "INSERT INTO chat_messages (user_id, character_id, role, content)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(user_id)
            .bind(character_id)
            .bind(role)
            .bind(content)
            .fetch_one(pool)
            .await
    }

    /// Store a user message and the assistant reply together.
    pub async fn create_exchange(
        pool: &PgPool,
        user_id: DbId,
        character_id: DbId,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(ChatMessage, ChatMessage), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "INSERT INTO chat_messages (user_id, character_id, role, content)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );

        let user_message = sqlx::query_as::<_, ChatMessage>(&query)
            .bind(user_id)
            .bind(character_id)
            .bind("user")
            .bind(user_content)
            .fetch_one(&mut *tx)
            .await?;
        let assistant_message = sqlx::query_as::<_, ChatMessage>(&query)
            .bind(user_id)
            .bind(character_id)
            .bind("assistant")
            .bind(assistant_content)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((user_message, assistant_message))
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ChatMessage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM chat_messages WHERE id = $1");
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The newest `limit` messages (before `before_id` when given), returned
    /// oldest first.
    pub async fn page(
        pool: &PgPool,
        user_id: DbId,
        character_id: DbId,
        limit: i64,
        before_id: Option<DbId>,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM (
                SELECT {COLUMNS} FROM chat_messages
                WHERE user_id = $1 AND character_id = $2
                  AND ($4::BIGINT IS NULL OR id < $4)
                ORDER BY id DESC
                LIMIT $3
             ) newest
             ORDER BY id"
        );
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(user_id)
            .bind(character_id)
            .bind(limit)
            .bind(before_id)
            .fetch_all(pool)
            .await
    }

    /// Delete a user's whole conversation with one companion.
    pub async fn clear(pool: &PgPool, user_id: DbId, character_id: DbId) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM chat_messages WHERE user_id = $1 AND character_id = $2")
                .bind(user_id)
                .bind(character_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_audio_url(
        pool: &PgPool,
        id: DbId,
        audio_url: &str,
    ) -> Result<Option<ChatMessage>, sqlx::Error> {
        let query = format!(
            "UPDATE chat_messages SET audio_url = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(id)
            .bind(audio_url)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_video_id(
        pool: &PgPool,
        id: DbId,
        video_id: DbId,
    ) -> Result<Option<ChatMessage>, sqlx::Error> {
        let query =
            format!("UPDATE chat_messages SET video_id = $2 WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(id)
            .bind(video_id)
            .fetch_optional(pool)
            .await
    }
}
