//! HTTP utilities for LLM providers
//!
//! Request/response handling shared by provider implementations.

use crate::llm::LlmError;
use crate::utils::truncate_str;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Longest provider error body kept in an `LlmError`
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client with the given request timeout.
///
/// The timeout prevents a hung provider from holding a chat forever.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an HTTP POST request with JSON body and returns parsed JSON response.
///
/// A `429 Too Many Requests` status is reported as [`LlmError::RateLimit`]
/// with the server's `Retry-After` hint when present.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::RateLimit`
/// on 429, `LlmError::ApiError` on other non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
    extra_headers: &[(&str, &str)],
) -> Result<Value, LlmError> {
    let mut request = client.post(url).json(body);

    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let wait_secs = parse_retry_after(response.headers());
        let error_text = response.text().await.unwrap_or_default();
        return Err(error_from_response(status, wait_secs, &error_text));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Reads a `Retry-After` header given in seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Maps a non-success response to an [`LlmError`].
///
/// The error keeps at most `MAX_ERROR_BODY_CHARS` of the body; the full body
/// is logged at debug level first.
fn error_from_response(status: StatusCode, wait_secs: Option<u64>, error_text: &str) -> LlmError {
    debug!(status = %status, body = %error_text, "Provider returned an error response");

    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimit {
            wait_secs,
            message: truncate_str(error_text.trim(), MAX_ERROR_BODY_CHARS),
        };
    }

    LlmError::ApiError(describe_error_body(status, error_text))
}

fn describe_error_body(status: StatusCode, error_text: &str) -> String {
    let trimmed = error_text.trim_start();
    // Nginx/proxy error pages
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if error_text.chars().count() > MAX_ERROR_BODY_CHARS {
        format!(
            "{status} - {}... (truncated)",
            truncate_str(error_text, MAX_ERROR_BODY_CHARS)
        )
    } else {
        format!("{status} - {error_text}")
    }
}
