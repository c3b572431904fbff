//! Adapter for user-supplied endpoints.
//!
//! Posts to the endpoint exactly as configured. `requestFormat: "openai"`
//! (the default) sends a chat-completions body; `"raw"` sends the normalized
//! request as-is and sniffs the reply for the generated text.

use async_trait::async_trait;
use serde::Serialize;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use byok_core::error::{ByokError, Result};
use byok_core::registry::WireFormat;
use byok_core::types::{
    FinishReason, NormalizedRequest, NormalizedResponse, RequestFormat, TokenUsage,
};

use crate::http::{header_map, log_request, send_json};
use crate::openai_compat::{parse_chat_completion, ChatCompletionRequest};
use crate::traits::{sampling, Credentials, ProviderAdapter};

/// Top-level fields checked, in order, for the generated text of a raw reply.
const RAW_CONTENT_FIELDS: &[&str] = &["content", "text", "response", "output"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

pub struct CustomAdapter {
    client: reqwest::Client,
}

impl CustomAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Parse a raw-format reply.
///
/// OpenAI-shaped bodies are recognised too, since many self-hosted servers
/// answer that way regardless of what they were sent.
fn parse_raw(body: Value, credentials: &Credentials) -> Result<NormalizedResponse> {
    if body.get("choices").is_some() {
        return parse_chat_completion(body, credentials);
    }

    let content = RAW_CONTENT_FIELDS
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .or_else(|| body.as_str())
        .ok_or_else(|| ByokError::Provider {
            status: 200,
            message: "Custom endpoint reply has no recognizable content field".to_string(),
        })?
        .to_string();

    Ok(NormalizedResponse {
        content,
        tokens_used: raw_usage(&body),
        model: body
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| credentials.model.clone()),
        provider: credentials.provider.clone(),
        finish_reason: FinishReason::from_provider(
            body.get("finishReason")
                .or_else(|| body.get("finish_reason"))
                .and_then(Value::as_str),
        ),
    })
}

/// Token counts from either `{input, output, total}` or OpenAI-style names.
fn raw_usage(body: &Value) -> TokenUsage {
    let Some(usage) = body.get("usage").or_else(|| body.get("tokensUsed")) else {
        return TokenUsage::default();
    };
    TokenUsage::new(
        first_count(usage, &["input", "prompt_tokens", "input_tokens"]).unwrap_or(0),
        first_count(usage, &["output", "completion_tokens", "output_tokens"]).unwrap_or(0),
        first_count(usage, &["total", "total_tokens"]),
    )
}

fn first_count(usage: &Value, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .find_map(|n| usage.get(*n).and_then(Value::as_u64))
}

#[async_trait]
impl ProviderAdapter for CustomAdapter {
    fn wire_format(&self) -> WireFormat {
        WireFormat::CustomOpenAiCompatible
    }

    async fn call(
        &self,
        request: &NormalizedRequest,
        credentials: &Credentials,
    ) -> Result<NormalizedResponse> {
        let url = credentials.base_url.as_str();
        if url.is_empty() {
            return Err(ByokError::InvalidConfig(
                "custom provider requires an endpoint URL".to_string(),
            ));
        }
        let format = credentials.settings.request_format.unwrap_or_default();
        log_request(
            &credentials.settings,
            &credentials.provider,
            url,
            &credentials.model,
        );

        let headers = header_map(&credentials.settings.headers);
        // A user-supplied Authorization header wins over the stored key.
        let has_auth = headers.contains_key(AUTHORIZATION);
        let mut builder = self.client.post(url).headers(headers);
        if !has_auth && !credentials.api_key.is_empty() {
            builder = builder.bearer_auth(credentials.api_key.expose());
        }

        match format {
            RequestFormat::OpenAi => {
                let body = ChatCompletionRequest::from_normalized(request, &credentials.model);
                let json =
                    send_json(builder.json(&body), &credentials.provider, &credentials.api_key)
                        .await?;
                parse_chat_completion(json, credentials)
            }
            RequestFormat::Raw => {
                let (temperature, max_tokens) = sampling(request);
                let body = RawRequest {
                    prompt: &request.prompt,
                    system_prompt: request.system_prompt.as_deref(),
                    temperature,
                    max_tokens,
                    model: Some(credentials.model.as_str()).filter(|m| !m.is_empty()),
                };
                let json =
                    send_json(builder.json(&body), &credentials.provider, &credentials.api_key)
                        .await?;
                parse_raw(json, credentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use byok_core::types::{ProviderSettings, SecretKey};
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter() -> CustomAdapter {
        CustomAdapter::new(reqwest::Client::new())
    }

    fn creds(endpoint: &str, settings: ProviderSettings) -> Credentials {
        Credentials::new("custom", SecretKey::new("local-token-abcdef"), "llama3", endpoint)
            .with_settings(settings)
    }

    fn raw_settings() -> ProviderSettings {
        ProviderSettings {
            request_format: Some(RequestFormat::Raw),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_openai_format_posts_to_exact_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/generate"))
            .and(header("Authorization", "Bearer local-token-abcdef"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "messages": [{ "role": "user", "content": "Hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Hello" }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 1 }
            })))
            .mount(&server)
            .await;

        let endpoint = format!("{}/api/v2/generate", server.uri());
        let resp = adapter()
            .call(
                &NormalizedRequest::new("Hi"),
                &creds(&endpoint, ProviderSettings::default()),
            )
            .await
            .unwrap();

        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.tokens_used, TokenUsage::new(3, 1, None));
        assert_eq!(resp.provider, "custom");
    }

    #[tokio::test]
    async fn test_raw_format_body_and_content_sniffing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .and(body_json(json!({
                "prompt": "Hi",
                "systemPrompt": "sys",
                "temperature": 0.5,
                "maxTokens": 10,
                "model": "llama3"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "raw hello",
                "usage": { "input": 4, "output": 2, "total": 6 }
            })))
            .mount(&server)
            .await;

        let request = NormalizedRequest::new("Hi")
            .with_system_prompt("sys")
            .with_temperature(0.5)
            .with_max_tokens(10);
        let endpoint = format!("{}/infer", server.uri());
        let resp = adapter()
            .call(&request, &creds(&endpoint, raw_settings()))
            .await
            .unwrap();

        assert_eq!(resp.content, "raw hello");
        assert_eq!(resp.tokens_used, TokenUsage::new(4, 2, Some(6)));
        assert_eq!(resp.model, "llama3");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_raw_format_accepts_openai_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "compat" }, "finish_reason": "stop" }]
            })))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri(), raw_settings()))
            .await
            .unwrap();
        assert_eq!(resp.content, "compat");
    }

    #[tokio::test]
    async fn test_raw_unrecognized_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "weird": 1 })))
            .mount(&server)
            .await;

        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri(), raw_settings()))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::Provider { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_extra_headers_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "ok" })))
            .mount(&server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("X-Tenant".to_string(), "acme".to_string());
        let settings = ProviderSettings {
            request_format: Some(RequestFormat::Raw),
            headers,
            ..Default::default()
        };
        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri(), settings))
            .await
            .unwrap();
        assert_eq!(resp.content, "ok");
    }

    #[tokio::test]
    async fn test_no_auth_header_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "anon" })))
            .mount(&server)
            .await;

        let credentials = Credentials::new("custom", SecretKey::new(""), "", server.uri())
            .with_settings(raw_settings());
        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &credentials)
            .await
            .unwrap();
        assert_eq!(resp.content, "anon");

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_custom_authorization_header_replaces_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Token team-gateway"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "ok" })))
            .mount(&server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Token team-gateway".to_string());
        let settings = ProviderSettings {
            request_format: Some(RequestFormat::Raw),
            headers,
            ..Default::default()
        };
        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri(), settings))
            .await
            .unwrap();
        assert_eq!(resp.content, "ok");

        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].headers.get_all("authorization").iter().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let err = adapter()
            .call(
                &NormalizedRequest::new("x"),
                &creds("", ProviderSettings::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::InvalidConfig(_)));
    }
}
