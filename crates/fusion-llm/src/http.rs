//! Shared request plumbing for vendor APIs.

use std::time::Duration;

use fusion_core::{DataError, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Sends `request` and decodes the JSON answer.
///
/// Error bodies are never included in the returned error; they can echo the
/// prompt or the credentials.
pub(crate) async fn send_json<T: DeserializeOwned>(
    vendor: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| DataError::Network(format!("{vendor}: {}", e.without_url())))?;

    let status = response.status();
    debug!(vendor, status = status.as_u16(), "Completion response");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(DataError::RateLimited {
            provider: vendor.to_string(),
            retry_after,
        });
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(DataError::AuthenticationFailed(vendor.to_string()));
    }
    if !status.is_success() {
        return Err(DataError::Network(format!("{vendor}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| DataError::Network(format!("{vendor}: {}", e.without_url())))?;
    serde_json::from_str(&body).map_err(|e| DataError::malformed_body(vendor, &body, e))
}

/// Rejects an empty completion.
pub(crate) fn non_empty(vendor: &str, text: Option<String>) -> Result<String> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(DataError::MalformedResponse {
            provider: vendor.to_string(),
            shape: "no text in completion".to_string(),
        }),
    }
}
