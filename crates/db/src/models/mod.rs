//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches

pub mod auth_token;
pub mod category;
pub mod character;
pub mod chat_message;
pub mod comment;
pub mod event;
pub mod image;
pub mod nut_transaction;
pub mod plan;
pub mod session;
pub mod subscription;
pub mod user;
pub mod video;
pub mod vote;
