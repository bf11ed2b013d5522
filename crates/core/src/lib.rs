//! Pure domain logic for the Muse platform.
//!
//! Nothing in this crate performs I/O. Handlers, repositories and background
//! tasks call into these modules for the rules that decide what gets written.

pub mod billing;
pub mod credits;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod moderation;
pub mod pagination;
pub mod prompt;
pub mod roles;
pub mod tokens;
pub mod types;
pub mod validation;
pub mod voting;
