//! Error type shared by every provider client.

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered 2xx but the body was not what we expect.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Inline media could not be decoded.
    #[error("Media decode error: {0}")]
    Decode(String),

    /// The service has no configuration in this deployment.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
