//! Services shared by handlers, webhooks and background tasks.
//!
//! - [`credits`]: charging and refunding nuts against the daily limits that
//!   apply to the caller.
//! - [`jobs`]: submitting GPU jobs and applying provider status updates to
//!   image and video rows.
//! - [`subscriptions`]: applying normalized billing events and manual plan
//!   grants.

pub mod credits;
pub mod jobs;
pub mod subscriptions;
