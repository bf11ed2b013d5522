//! Muse event bus and account mail delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope; names live in
//!   [`event_types`].
//! - [`EventRecorder`]: background task storing bus traffic in the
//!   `events` table, batched.
//! - [`delivery`]: account emails (verification, password reset) over SMTP,
//!   or to the log when SMTP is not configured.

pub mod bus;
pub mod delivery;
pub mod recorder;

pub use bus::{event_types, EventBus, PlatformEvent};
pub use delivery::email::{AccountMail, EmailConfig, EmailDelivery, EmailError, LogMailer, Mailer};
pub use recorder::{EventRecorder, RecorderStats};
