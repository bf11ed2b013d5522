//! Repository for the `events` table.

use muse_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::{Event, NewEvent};

const COLUMNS: &str =
    "id, event_type, source_entity_type, source_entity_id, actor_user_id, payload, created_at";

/// Append-only store of platform events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a single event, keeping its original timestamp.
    pub async fn insert(pool: &PgPool, event: &NewEvent<'_>) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                (event_type, source_entity_type, source_entity_id, actor_user_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(event.event_type)
        .bind(event.source_entity_type)
        .bind(event.source_entity_id)
        .bind(event.actor_user_id)
        .bind(event.payload)
        .bind(event.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// Insert many events in one statement. All or nothing: a single bad
    /// row (e.g. an actor that has since been deleted) fails the batch.
    pub async fn insert_batch(pool: &PgPool, events: &[NewEvent<'_>]) -> Result<u64, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut types = Vec::with_capacity(events.len());
        let mut entity_types = Vec::with_capacity(events.len());
        let mut entity_ids = Vec::with_capacity(events.len());
        let mut actors = Vec::with_capacity(events.len());
        let mut payloads = Vec::with_capacity(events.len());
        let mut occurred = Vec::with_capacity(events.len());
        for e in events {
            types.push(e.event_type);
            entity_types.push(e.source_entity_type);
            entity_ids.push(e.source_entity_id);
            actors.push(e.actor_user_id);
            payloads.push(e.payload.clone());
            occurred.push(e.occurred_at);
        }

        let result = sqlx::query(
            "INSERT INTO events \
                (event_type, source_entity_type, source_entity_id, actor_user_id, payload, created_at) \
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::bigint[], $4::bigint[], $5::jsonb[], $6::timestamptz[])",
        )
        .bind(&types)
        .bind(&entity_types)
        .bind(&entity_ids)
        .bind(&actors)
        .bind(&payloads)
        .bind(&occurred)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List recent events ordered newest-first.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
