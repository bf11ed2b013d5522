//! Companion chat message model.

use muse_core::prompt::{ChatRole, ChatTurn};
use muse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `chat_messages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatMessage {
    pub id: DbId,
    pub user_id: DbId,
    pub character_id: DbId,
    pub role: String,
    pub content: String,
    pub audio_url: Option<String>,
    pub video_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn::new(ChatRole::parse(&self.role), self.content.clone())
    }
}

/// Paging parameters for a conversation (`?limit=&before_id=`).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MessagePageQuery {
    pub limit: Option<i64>,
    pub before_id: Option<DbId>,
}
