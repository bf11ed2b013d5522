//! Request handlers, one submodule per resource.
//!
//! Handlers validate input, delegate to the repositories in `muse_db` (and
//! to [`crate::engine`] for charging, GPU jobs and subscriptions) and map
//! errors via [`crate::error::AppError`].

pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod categories;
pub mod characters;
pub mod chat;
pub mod comments;
pub mod images;
pub mod moderation;
pub mod videos;
pub mod votes;
pub mod webhooks;
