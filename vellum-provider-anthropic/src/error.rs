//! HTTP and transport error mapping for the Anthropic API.
//!
//! Reference: <https://docs.anthropic.com/en/api/errors>

use std::time::Duration;

use vellum_types::LlmError;

/// Map an HTTP error status to the shared taxonomy. 529 is Anthropic's
/// overloaded status and is treated like any other 5xx.
pub(crate) fn map_http_status(
    status: reqwest::StatusCode,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    body: &str,
) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Authentication(summarize(body)),
        429 => LlmError::RateLimit { retry_after },
        code => LlmError::Service {
            status: code,
            provider: "anthropic".to_string(),
            request_id,
            message: summarize(body),
        },
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    LlmError::Network {
        message: err.to_string(),
        recoverable: true,
    }
}

/// Parse a `retry-after` header value in seconds.
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

/// The `request-id` header Anthropic attaches to every response.
pub(crate) fn request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn summarize(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_529_is_recoverable() {
        let err = map_http_status(
            reqwest::StatusCode::from_u16(529).unwrap(),
            None,
            None,
            r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(err.is_recoverable());
        assert!(matches!(err, LlmError::Service { status: 529, .. }));
    }

    #[test]
    fn unauthorized_is_terminal() {
        let err = map_http_status(reqwest::StatusCode::UNAUTHORIZED, None, None, "{}");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn error_message_extracted_from_body() {
        let err = map_http_status(
            reqwest::StatusCode::BAD_REQUEST,
            Some("req_x".into()),
            None,
            r#"{"error":{"type":"invalid_request_error","message":"max_tokens required"}}"#,
        );
        assert!(err.to_string().contains("max_tokens required"));
        assert!(err.to_string().contains("requestId=req_x"));
    }
}
