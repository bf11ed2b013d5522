//! Query parameter types shared across handler modules.

use serde::Deserialize;

/// `?limit=&offset=`. Clamped in the handler with `clamp_limit` /
/// `clamp_offset`.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `?status=&limit=&offset=` for moderation queues.
#[derive(Debug, Deserialize)]
pub struct ModerationQueueParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `?q=&limit=&offset=` for the admin user search.
#[derive(Debug, Deserialize)]
pub struct UserSearchParams {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
