//! Payment providers for plan subscriptions.
//!
//! [`PaymentProvider`] covers what the platform needs from a gateway:
//! start a hosted checkout, cancel a subscription, and turn a verified
//! webhook delivery into a provider-neutral [`BillingEvent`]. Stripe and
//! PayPal are implemented over their REST APIs.

pub mod error;
pub mod event;
mod http;
pub mod paypal;
pub mod provider;
pub mod stripe;

pub use error::BillingError;
pub use event::{BillingEvent, BillingEventKind};
pub use paypal::{PayPalClient, PayPalConfig};
pub use provider::{CheckoutRequest, CheckoutSession, PaymentProvider};
pub use stripe::{StripeClient, StripeConfig};
