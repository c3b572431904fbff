//! Google Generative Language (Gemini) adapter.
//!
//! `POST {base}/models/{model}:generateContent?key=...`. The key travels as a
//! query parameter, so every error path strips the URL before reporting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use byok_core::error::{ByokError, Result};
use byok_core::registry::WireFormat;
use byok_core::types::{FinishReason, NormalizedRequest, NormalizedResponse, TokenUsage};

use crate::http::{join_url, log_request, send_json};
use crate::traits::{sampling, Credentials, ProviderAdapter};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: Option<u64>,
}

pub struct GoogleAdapter {
    client: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// `{base}/models/{model}:generateContent`, with the model percent-encoded
/// as a single path segment.
fn generate_url(base: &str, model: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&join_url(base, "models"))
        .map_err(|e| ByokError::InvalidConfig(format!("invalid Google base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ByokError::InvalidConfig("Google base URL cannot take a path".to_string()))?
        .push(&format!("{model}:generateContent"));
    Ok(url)
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn wire_format(&self) -> WireFormat {
        WireFormat::Google
    }

    async fn call(
        &self,
        request: &NormalizedRequest,
        credentials: &Credentials,
    ) -> Result<NormalizedResponse> {
        let url = generate_url(&credentials.base_url, &credentials.model)?;
        let (temperature, max_tokens) = sampling(request);
        let body = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system_prompt.as_deref().map(|text| SystemInstruction {
                parts: [Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
        };
        log_request(
            &credentials.settings,
            &credentials.provider,
            url.as_str(),
            &credentials.model,
        );

        let builder = self
            .client
            .post(url)
            .query(&[("key", credentials.api_key.expose())])
            .json(&body);

        let json = send_json(builder, &credentials.provider, &credentials.api_key).await?;
        let parsed: GenerateContentResponse =
            serde_json::from_value(json).map_err(|e| ByokError::Provider {
                status: 200,
                message: format!("Unexpected generateContent shape: {e}"),
            })?;

        // No candidates means the prompt was blocked.
        let (content, finish_reason) = match parsed.candidates.into_iter().next() {
            Some(candidate) => (
                candidate
                    .content
                    .map(|c| {
                        c.parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default(),
                FinishReason::from_provider(candidate.finish_reason.as_deref()),
            ),
            None => (String::new(), FinishReason::Error),
        };

        let tokens_used = parsed
            .usage_metadata
            .map(|u| {
                TokenUsage::new(
                    u.prompt_token_count,
                    u.candidates_token_count,
                    u.total_token_count,
                )
            })
            .unwrap_or_default();

        Ok(NormalizedResponse {
            content,
            tokens_used,
            model: parsed
                .model_version
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| credentials.model.clone()),
            provider: credentials.provider.clone(),
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byok_core::types::SecretKey;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "AIzaSyTestKey1234567890";

    fn creds(base: &str) -> Credentials {
        Credentials::new("google", SecretKey::new(KEY), "gemini-1.5-pro", base)
    }

    fn adapter() -> GoogleAdapter {
        GoogleAdapter::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_call_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .and(query_param("key", KEY))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }],
                "systemInstruction": { "parts": [{ "text": "Be brief." }] },
                "generationConfig": { "maxOutputTokens": 50 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Hi!" }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 7,
                    "candidatesTokenCount": 2,
                    "totalTokenCount": 9
                },
                "modelVersion": "gemini-1.5-pro-002"
            })))
            .mount(&server)
            .await;

        let request = NormalizedRequest::new("Hello")
            .with_system_prompt("Be brief.")
            .with_max_tokens(50);
        let resp = adapter().call(&request, &creds(&server.uri())).await.unwrap();

        assert_eq!(resp.content, "Hi!");
        assert_eq!(resp.tokens_used, TokenUsage::new(7, 2, Some(9)));
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert_eq!(resp.model, "gemini-1.5-pro-002");
        assert_eq!(resp.provider, "google");
    }

    #[test]
    fn test_model_is_one_path_segment() {
        let url = generate_url("https://example.test/v1beta/", "gemini-1.5-pro").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v1beta/models/gemini-1.5-pro:generateContent"
        );

        let url = generate_url("https://example.test/v1beta", "../../evil?key=x#frag").unwrap();
        assert!(url.path().starts_with("/v1beta/models/"));
        assert!(url.path().contains("%2F"));
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_bad_base_url_is_invalid_config() {
        let err = generate_url("not a url", "gemini-1.5-pro").unwrap_err();
        assert!(matches!(err, ByokError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_max_tokens_finish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "cut" }] },
                    "finishReason": "MAX_TOKENS"
                }]
            })))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let resp = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Error);
        assert!(resp.content.is_empty());
    }

    #[tokio::test]
    async fn test_resource_exhausted_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
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
    async fn test_invalid_key_error_hides_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": format!("API key not valid: {KEY}"),
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::Provider { status: 400, .. }));
        assert!(!err.to_string().contains(KEY));
    }

    #[tokio::test]
    async fn test_network_error_hides_key() {
        let err = adapter()
            .call(&NormalizedRequest::new("x"), &creds("http://127.0.0.1:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ByokError::Network(_)));
        assert!(!err.to_string().contains(KEY));
    }
}
