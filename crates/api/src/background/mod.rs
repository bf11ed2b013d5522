//! Periodic maintenance spawned from `main.rs`.
//!
//! - [`job_reconciler`]: polls GPU jobs whose webhook never arrived and
//!   fails the ones past `JOB_TIMEOUT_MINS`.
//! - [`subscription_expiry`]: ends lapsed subscriptions.
//!
//! Both loops stop when the shared `CancellationToken` fires.

pub mod job_reconciler;
pub mod subscription_expiry;
