//! Request extractors for authentication and authorization.
//!
//! - [`auth::AuthUser`] -- the caller, from a JWT bearer token.
//! - [`auth::MaybeAuthUser`] -- the caller if a token was sent.
//! - [`rbac::RequireAdmin`] / [`rbac::RequireModerator`] -- role gates.

pub mod auth;
pub mod rbac;
