//! Shared HTTP plumbing for the adapters: client construction, sending,
//! status classification, and error-body extraction.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::RequestBuilder;
use tracing::{debug, error, warn};

use byok_core::error::{ByokError, Result};
use byok_core::types::{ProviderSettings, SecretKey};
use byok_core::utils::truncate_string;
use byok_security::redact::{sanitize_error, scrub_secret};

/// Longest provider error message passed on to callers.
const MAX_ERROR_LEN: usize = 500;

/// Structured error codes providers use to signal quota exhaustion or
/// throttling. Matched against `error.code`, `error.type` and `error.status`.
const QUOTA_CODES: &[&str] = &[
    "insufficient_quota",
    "rate_limit_exceeded",
    "rate_limit_error",
    "RESOURCE_EXHAUSTED",
];

/// Build a connection-pooled client with an overall request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// `{base}/{path}` without doubled slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Convert user-supplied headers, skipping (and logging) invalid ones.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(val)) => {
                map.insert(name, val);
            }
            _ => warn!(header = %key, "skipping invalid custom header"),
        }
    }
    map
}

/// Emit sanitized request metadata when the user turned on `logRequests`.
pub(crate) fn log_request(settings: &ProviderSettings, provider: &str, url: &str, model: &str) {
    if settings.log_requests {
        debug!(
            provider,
            url = %sanitize_error(url),
            model,
            "outbound provider request"
        );
    }
}

/// Sanitize a message for the outside world: pattern redaction, the exact
/// key scrubbed, and a length cap.
pub(crate) fn clean_message(message: &str, api_key: &SecretKey) -> String {
    let scrubbed = scrub_secret(message, api_key.expose());
    truncate_string(&sanitize_error(&scrubbed), MAX_ERROR_LEN)
}

/// Whether a failed response means "slow down" rather than "broken".
///
/// Free-text messages are never consulted: "see your quota page" in a 401
/// is still an auth failure.
pub(crate) fn is_rate_limited(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    ["/error/code", "/error/type", "/error/status"]
        .iter()
        .filter_map(|path| value.pointer(path).and_then(|v| v.as_str()))
        .any(|code| QUOTA_CODES.contains(&code))
}

/// Pull the human-readable message out of a provider error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}` and `[{"error": {..}}]`; anything else is returned raw.
pub(crate) fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };

    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Send a prepared request and return the parsed JSON body of a 2xx reply.
///
/// Non-2xx replies become `RateLimit` or `Provider` errors with a sanitized
/// message; transport failures become `Network`.
pub(crate) async fn send_json(
    request: RequestBuilder,
    provider: &str,
    api_key: &SecretKey,
) -> Result<serde_json::Value> {
    let response = request.send().await.map_err(|e| {
        let message = clean_message(&e.without_url().to_string(), api_key);
        error!(provider, error = %message, "HTTP request failed");
        ByokError::Network(message)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        let message = clean_message(&extract_error_message(&body), api_key);
        error!(provider, status = %status, error = %message, "API error");

        return Err(if is_rate_limited(status.as_u16(), &body) {
            ByokError::RateLimit(message)
        } else {
            ByokError::Provider {
                status: status.as_u16(),
                message,
            }
        });
    }

    response.json::<serde_json::Value>().await.map_err(|e| {
        let message = clean_message(&e.without_url().to_string(), api_key);
        error!(provider, error = %message, "Failed to parse provider response");
        ByokError::Provider {
            status: status.as_u16(),
            message: format!("Invalid response body: {message}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://api.anthropic.com/v1", "messages"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_extract_error_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"Invalid API key","type":"auth"}}"#),
            "Invalid API key"
        );
        assert_eq!(extract_error_message(r#"{"error":"bad"}"#), "bad");
        assert_eq!(extract_error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(
            extract_error_message(r#"[{"error":{"code":400,"message":"first"}}]"#),
            "first"
        );
        assert_eq!(extract_error_message("  gateway down \n"), "gateway down");
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited(429, ""));
        assert!(is_rate_limited(403, r#"{"error":{"code":"insufficient_quota"}}"#));
        assert!(is_rate_limited(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#));
        assert!(is_rate_limited(400, r#"{"type":"error","error":{"type":"rate_limit_error"}}"#));
        assert!(is_rate_limited(
            403,
            r#"[{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}]"#
        ));
        assert!(!is_rate_limited(401, r#"{"error":{"message":"Invalid key"}}"#));
    }

    #[test]
    fn test_quota_wording_in_message_is_not_rate_limit() {
        assert!(!is_rate_limited(
            401,
            r#"{"error":{"message":"Invalid API key. See your usage and quota page","type":"invalid_request_error"}}"#
        ));
        assert!(!is_rate_limited(500, r#"{"error":"quota service unavailable"}"#));
        assert!(!is_rate_limited(503, "rate_limit upstream proxy text"));
    }

    #[tokio::test]
    async fn test_send_json_keeps_auth_error_with_quota_wording() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":{"message":"Invalid API key. See your usage and quota page"}}"#,
            ))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let key = SecretKey::new("sk-test-unused");
        let err = send_json(client.post(server.uri()), "openai", &key)
            .await
            .unwrap_err();
        match err {
            ByokError::Provider { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_message_scrubs_exact_key() {
        let key = SecretKey::new("odd#shaped$key");
        let msg = clean_message("Incorrect API key provided: odd#shaped$key", &key);
        assert!(!msg.contains("odd#shaped$key"));
    }

    #[test]
    fn test_clean_message_truncates() {
        let key = SecretKey::new("unused-key");
        let msg = clean_message(&"x".repeat(2000), &key);
        assert_eq!(msg.chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_header_map_skips_invalid() {
        let mut headers = HashMap::new();
        headers.insert("X-Team".to_string(), "research".to_string());
        headers.insert("bad header".to_string(), "v".to_string());
        let map = header_map(&headers);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("x-team"));
    }
}
