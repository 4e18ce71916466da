//! HTTP and transport error mapping for the OpenAI-family dialect.

use std::time::Duration;

use vellum_types::LlmError;

/// Map an HTTP error status to the shared taxonomy.
///
/// `retry_after` is the parsed `Retry-After` header, when the response
/// carried one.
pub(crate) fn map_http_status(
    status: reqwest::StatusCode,
    provider: &str,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    body: &str,
) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Authentication(summarize(body)),
        429 => LlmError::RateLimit { retry_after },
        code => LlmError::Service {
            status: code,
            provider: provider.to_string(),
            request_id,
            message: summarize(body),
        },
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() || err.is_connect() {
        LlmError::Network {
            message: err.to_string(),
            recoverable: true,
        }
    } else if err.is_decode() {
        LlmError::Unknown {
            message: format!("malformed response: {err}"),
            source: Some(Box::new(err)),
        }
    } else {
        LlmError::Network {
            message: err.to_string(),
            recoverable: true,
        }
    }
}

/// Parse a `Retry-After` header value (seconds form only).
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Provider-assigned request id, when present.
pub(crate) fn request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Pull the API error message out of a JSON error body, falling back to
/// the raw text.
fn summarize(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
