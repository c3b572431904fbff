//! Anthropic Messages API adapter.
//!
//! `POST {base}/messages` with `x-api-key` and `anthropic-version` headers.
//! The system prompt is a top-level field, not a message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use byok_core::error::{ByokError, Result};
use byok_core::registry::WireFormat;
use byok_core::types::{FinishReason, NormalizedRequest, NormalizedResponse, TokenUsage};

use crate::http::{join_url, log_request, send_json};
use crate::traits::{sampling, Credentials, ProviderAdapter};

/// Sent when the user's settings don't pin a version.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicAdapter {
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn wire_format(&self) -> WireFormat {
        WireFormat::Anthropic
    }

    async fn call(
        &self,
        request: &NormalizedRequest,
        credentials: &Credentials,
    ) -> Result<NormalizedResponse> {
        let url = join_url(&credentials.base_url, "messages");
        let (temperature, max_tokens) = sampling(request);
        let body = MessagesRequest {
            model: &credentials.model,
            max_tokens,
            temperature,
            system: request.system_prompt.as_deref(),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };
        let version = credentials
            .settings
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);
        log_request(
            &credentials.settings,
            &credentials.provider,
            &url,
            &credentials.model,
        );

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", credentials.api_key.expose())
            .header("anthropic-version", version)
            .json(&body);

        let json = send_json(builder, &credentials.provider, &credentials.api_key).await?;
        let parsed: MessagesResponse =
            serde_json::from_value(json).map_err(|e| ByokError::Provider {
                status: 200,
                message: format!("Unexpected messages response shape: {e}"),
            })?;

        // Concatenate every text block; tool-use and other blocks are skipped.
        let content = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let tokens_used = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens, None))
            .unwrap_or_default();

        Ok(NormalizedResponse {
            content,
            tokens_used,
            model: parsed
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| credentials.model.clone()),
            provider: credentials.provider.clone(),
            finish_reason: FinishReason::from_provider(parsed.stop_reason.as_deref()),
        })
    }
}
