//! Credentials: argon2id password hashes ([`password`]) and JWT access
//! tokens plus opaque refresh tokens ([`jwt`]).

pub mod jwt;
pub mod password;
