//! OpenAI-compatible chat-completions adapter (OpenAI, DeepSeek, Mistral).
//!
//! `POST {base}/chat/completions` with bearer auth and an optional
//! `OpenAI-Organization` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use byok_core::error::{ByokError, Result};
use byok_core::registry::WireFormat;
use byok_core::types::{FinishReason, NormalizedRequest, NormalizedResponse, TokenUsage};

use crate::http::{join_url, log_request, send_json};
use crate::traits::{sampling, Credentials, ProviderAdapter};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "is_blank")]
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f64,
    pub max_tokens: u32,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn from_normalized(request: &'a NormalizedRequest, model: &'a str) -> Self {
        let (temperature, max_tokens) = sampling(request);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        Self {
            model,
            messages,
            temperature,
            max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// Parse a chat-completions body into the normalized shape.
///
/// A reply without choices is reported as an `error` finish with empty content.
pub(crate) fn parse_chat_completion(
    body: serde_json::Value,
    credentials: &Credentials,
) -> Result<NormalizedResponse> {
    let parsed: ChatCompletionResponse =
        serde_json::from_value(body).map_err(|e| ByokError::Provider {
            status: 200,
            message: format!("Unexpected chat completion shape: {e}"),
        })?;

    let (content, finish_reason) = match parsed.choices.into_iter().next() {
        Some(choice) => (
            choice
                .message
                .and_then(|m| m.content)
                .unwrap_or_default(),
            FinishReason::from_provider(choice.finish_reason.as_deref()),
        ),
        None => (String::new(), FinishReason::Error),
    };

    let tokens_used = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens, u.total_tokens))
        .unwrap_or_default();

    Ok(NormalizedResponse {
        content,
        tokens_used,
        model: parsed
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| credentials.model.clone()),
        provider: credentials.provider.clone(),
        finish_reason,
    })
}

// ─────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────

/// Adapter for every provider speaking the chat-completions format.
pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn wire_format(&self) -> WireFormat {
        WireFormat::OpenAiCompatible
    }

    async fn call(
        &self,
        request: &NormalizedRequest,
        credentials: &Credentials,
    ) -> Result<NormalizedResponse> {
        let url = join_url(&credentials.base_url, "chat/completions");
        let body = ChatCompletionRequest::from_normalized(request, &credentials.model);
        log_request(
            &credentials.settings,
            &credentials.provider,
            &url,
            &credentials.model,
        );

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(credentials.api_key.expose())
            .json(&body);
        if let Some(org) = credentials.settings.organization.as_deref() {
            builder = builder.header("OpenAI-Organization", org);
        }

        let json = send_json(builder, &credentials.provider, &credentials.api_key).await?;
        parse_chat_completion(json, credentials)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use byok_core::types::{ProviderSettings, SecretKey};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter() -> OpenAiCompatibleAdapter {
        OpenAiCompatibleAdapter::new(reqwest::Client::new())
    }

    fn creds(base: &str) -> Credentials {
        Credentials::new("openai", SecretKey::new("sk-test-key-123"), "gpt-4o", base)
    }

    fn ok_body() -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": { "role": "assistant", "content": "OK" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    #[tokio::test]
    async fn test_call_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("Say OK"), &creds(&server.uri()))
            .await
            .unwrap();

        assert_eq!(resp.content, "OK");
        assert_eq!(resp.tokens_used, TokenUsage::new(10, 5, Some(15)));
        assert_eq!(resp.model, "gpt-4o-2024-08-06");
        assert_eq!(resp.provider, "openai");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_sends_messages_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "Be terse." },
                    { "role": "user", "content": "Hi" }
                ],
                "temperature": 0.2,
                "max_tokens": 64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let request = NormalizedRequest::new("Hi")
            .with_system_prompt("Be terse.")
            .with_temperature(0.2)
            .with_max_tokens(64);
        let resp = adapter().call(&request, &creds(&server.uri())).await;
        // A body mismatch makes wiremock answer 404.
        assert!(resp.is_ok(), "{resp:?}");
    }

    #[tokio::test]
    async fn test_organization_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("OpenAI-Organization", "org-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let credentials = creds(&server.uri()).with_settings(ProviderSettings {
            organization: Some("org-123".to_string()),
            ..Default::default()
        });
        assert!(adapter()
            .call(&NormalizedRequest::new("x"), &credentials)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_length_finish_and_missing_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "trunc" }, "finish_reason": "length" }]
            })))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Length);
        assert_eq!(resp.tokens_used.total, 0);
        assert_eq!(resp.model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_unauthorized_is_provider_error_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Incorrect API key provided: sk-test-key-123.",
                    "type": "invalid_request_error"
                }
            })))
            .mount(&server)
            .await;

        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap_err();
        match err {
            ByokError::Provider { status, message } => {
                assert_eq!(status, 401);
                assert!(!message.contains("sk-test-key-123"), "{message}");
                assert!(message.contains("Incorrect API key provided"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_429_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached", "type": "requests" }
            })))
            .mount(&server)
            .await;

        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_insufficient_quota_body_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "message": "You exceeded your current quota", "code": "insufficient_quota" }
            })))
            .mount(&server)
            .await;

        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_network_error() {
        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds("http://127.0.0.1:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::Network(_)));
    }

    #[tokio::test]
    async fn test_no_choices_is_error_finish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Error);
        assert!(resp.content.is_empty());
    }
}
