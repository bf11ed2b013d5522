#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("Payment provider error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// The webhook or API body did not have the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The plan has no price configured for this provider.
    #[error("Plan is not available through {0}")]
    PlanUnavailable(&'static str),
}
