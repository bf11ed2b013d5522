//! Repository for the `characters` (companions) table.

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::character::{Character, CreateCharacter, UpdateCharacter};

const COLUMNS: &str = "id, owner_id, name, tagline, personality, appearance, scenario, greeting, \
                       voice_id, avatar_url, is_public, is_active, created_at, updated_at";

/// Provides CRUD operations for companions.
pub struct CharacterRepo;

impl CharacterRepo {
    /// Insert a companion. `owner_id = None` creates a system companion.
    pub async fn create(
        pool: &PgPool,
        owner_id: Option<DbId>,
        input: &CreateCharacter,
    ) -> Result<Character, sqlx::Error> {
        let query = format!(
            "INSERT INTO characters
                (owner_id, name, tagline, personality, appearance, scenario, greeting,
                 voice_id, avatar_url, is_public)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, false))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Character>(&query)
            .bind(owner_id)
            .bind(&input.name)
            .bind(&input.tagline)
            .bind(&input.personality)
            .bind(&input.appearance)
            .bind(&input.scenario)
            .bind(&input.greeting)
            .bind(&input.voice_id)
            .bind(&input.avatar_url)
            .bind(input.is_public)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Character>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE id = $1");
        sqlx::query_as::<_, Character>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active companions `user_id` can see: system ones, public ones, and
    /// their own. System companions come first.
    pub async fn list_visible(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Character>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM characters
             WHERE is_active = true
               AND (owner_id IS NULL OR is_public = true OR owner_id = $1)
             ORDER BY (owner_id IS NULL) DESC, name, id
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Character>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update a companion. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateCharacter,
    ) -> Result<Option<Character>, sqlx::Error> {
        let query = format!(
            "UPDATE characters SET
                name = COALESCE($2, name),
                tagline = COALESCE($3, tagline),
                personality = COALESCE($4, personality),
                appearance = COALESCE($5, appearance),
                scenario = COALESCE($6, scenario),
                greeting = COALESCE($7, greeting),
                voice_id = COALESCE($8, voice_id),
                avatar_url = COALESCE($9, avatar_url),
                is_public = COALESCE($10, is_public),
                is_active = COALESCE($11, is_active)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Character>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.tagline)
            .bind(&input.personality)
            .bind(&input.appearance)
            .bind(&input.scenario)
            .bind(&input.greeting)
            .bind(&input.voice_id)
            .bind(&input.avatar_url)
            .bind(input.is_public)
            .bind(input.is_active)
            .fetch_optional(pool)
            .await
    }

    /// Delete a companion and, by cascade, its chat history.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM characters WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
