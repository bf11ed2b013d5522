//! Response and environment helpers shared by the gateways.

use crate::error::BillingError;

/// Pass 2xx responses through; anything else becomes [`BillingError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, BillingError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(BillingError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Check the status, then parse the JSON body.
pub(crate) async fn parse_json(
    response: reqwest::Response,
) -> Result<serde_json::Value, BillingError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BillingError::InvalidPayload(e.to_string()))
}

/// Read an optional env var, treating blank values as unset.
pub(crate) fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// String field at a JSON pointer, if present and non-empty.
pub(crate) fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
