//! The Muse HTTP API as a library, so `main.rs` and `tests/` build the same
//! router over the same [`state::AppState`].

pub mod auth;
pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
