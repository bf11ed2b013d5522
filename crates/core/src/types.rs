//! Column aliases shared by every crate.

/// Primary key of every table (`BIGSERIAL`).
pub type DbId = i64;

/// A `TIMESTAMPTZ` value, read and written in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
