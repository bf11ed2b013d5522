//! Companion (character) model and DTOs.

use muse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `characters` table.
///
/// `owner_id = None` marks a system companion managed by admins.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Character {
    pub id: DbId,
    pub owner_id: Option<DbId>,
    pub name: String,
    pub tagline: Option<String>,
    pub personality: Option<String>,
    pub appearance: Option<String>,
    pub scenario: Option<String>,
    pub greeting: Option<String>,
    pub voice_id: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Character {
    /// Whether `user_id` may chat with or view this companion.
    pub fn is_visible_to(&self, user_id: DbId) -> bool {
        self.is_active && (self.owner_id.is_none() || self.is_public || self.owner_id == Some(user_id))
    }
}

/// DTO for creating a companion.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCharacter {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: String,
    #[validate(length(max = 160, message = "Tagline must be at most 160 characters"))]
    pub tagline: Option<String>,
    #[validate(length(max = 4000, message = "Personality must be at most 4000 characters"))]
    pub personality: Option<String>,
    #[validate(length(max = 2000, message = "Appearance must be at most 2000 characters"))]
    pub appearance: Option<String>,
    #[validate(length(max = 4000, message = "Scenario must be at most 4000 characters"))]
    pub scenario: Option<String>,
    #[validate(length(max = 2000, message = "Greeting must be at most 2000 characters"))]
    pub greeting: Option<String>,
    pub voice_id: Option<String>,
    #[validate(url(message = "Avatar URL must be a valid URL"))]
    pub avatar_url: Option<String>,
    pub is_public: Option<bool>,
}

/// DTO for updating a companion. All fields are optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCharacter {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 160, message = "Tagline must be at most 160 characters"))]
    pub tagline: Option<String>,
    #[validate(length(max = 4000, message = "Personality must be at most 4000 characters"))]
    pub personality: Option<String>,
    #[validate(length(max = 2000, message = "Appearance must be at most 2000 characters"))]
    pub appearance: Option<String>,
    #[validate(length(max = 4000, message = "Scenario must be at most 4000 characters"))]
    pub scenario: Option<String>,
    #[validate(length(max = 2000, message = "Greeting must be at most 2000 characters"))]
    pub greeting: Option<String>,
    pub voice_id: Option<String>,
    #[validate(url(message = "Avatar URL must be a valid URL"))]
    pub avatar_url: Option<String>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
}
