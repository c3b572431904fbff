//! Core types for byok: provider ids, stored preferences, and the normalized
//! request/response contract every adapter converts to and from.
//!
//! JSON uses **camelCase** keys so rows written by the surrounding application
//! deserialize without a translation layer.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ByokError;

// ─────────────────────────────────────────────
// Provider identifiers
// ─────────────────────────────────────────────

/// The providers a user can pick from.
///
/// `Unset` (`"none"`) is a valid stored value ("user opted out") but never resolves to an
/// adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    #[serde(alias = "claude")]
    Anthropic,
    #[serde(alias = "gemini")]
    Google,
    DeepSeek,
    Mistral,
    Custom,
    #[serde(rename = "none")]
    Unset,
}

impl ProviderId {
    /// Canonical id as stored in preference rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Mistral => "mistral",
            ProviderId::Custom => "custom",
            ProviderId::Unset => "none",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ByokError;

    /// Parse a provider id, accepting the product-name aliases users type
    /// (`claude`, `gemini`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "google" | "gemini" => Ok(ProviderId::Google),
            "deepseek" => Ok(ProviderId::DeepSeek),
            "mistral" => Ok(ProviderId::Mistral),
            "custom" => Ok(ProviderId::Custom),
            "none" | "" => Ok(ProviderId::Unset),
            other => Err(ByokError::UnsupportedProvider(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────
// Connection status
// ─────────────────────────────────────────────

/// Result of the most recent connection probe for a stored preference.
///
/// `untested → testing → {connected | error | quota_exceeded}`; every new probe
/// re-enters `testing`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Untested,
    Testing,
    Connected,
    Error,
    QuotaExceeded,
}

// ─────────────────────────────────────────────
// Provider settings
// ─────────────────────────────────────────────

/// Body shape used by the `custom` provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFormat {
    /// OpenAI chat-completions body and response.
    #[default]
    OpenAi,
    /// Normalized request sent as-is; response content sniffed from common fields.
    Raw,
}

/// Free-form provider settings attached to a preference.
///
/// Well-known keys are typed; anything else lands in `extra` and round-trips
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// OpenAI organization id (sent as `OpenAI-Organization`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// API version header value (Anthropic `anthropic-version`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Body shape for the custom provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_format: Option<RequestFormat>,
    pub debug: bool,
    pub log_requests: bool,
    /// Extra HTTP headers sent with every request (custom provider).
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ─────────────────────────────────────────────
// Secrets
// ─────────────────────────────────────────────

/// A plaintext API key.
///
/// `Debug` and `Display` never print the value; call [`SecretKey::expose`] at
/// the exact point the key goes on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        SecretKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Opaque encrypted API key as stored in a preference row.
///
/// Only the credential vault knows how to open it.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        EncryptedBlob(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

// ─────────────────────────────────────────────
// Provider config (caller input)
// ─────────────────────────────────────────────

/// What a user submits when configuring their provider.
///
/// Holds the plaintext key, so it is deserializable (form input) but
/// deliberately not serializable.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub provider: String,
    pub api_key: String,
    pub model: Option<String>,
    pub custom_endpoint: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub provider_settings: ProviderSettings,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        ProviderConfig {
            provider: provider.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_custom_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.custom_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.provider_settings = settings;
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("custom_endpoint", &self.custom_endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ─────────────────────────────────────────────
// Stored preference
// ─────────────────────────────────────────────

/// Default sampling temperature when the user doesn't pick one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default output budget when the user doesn't pick one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Allowed temperature range (inclusive).
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);
/// Allowed max-tokens range (inclusive).
pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 100_000);

/// One user's active provider configuration, as persisted by the preference store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPreference {
    pub user_id: String,
    pub provider: String,
    pub encrypted_api_key: EncryptedBlob,
    /// Masked display form of the key (`sk-...abcd`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_endpoint: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default)]
    pub provider_settings: ProviderSettings,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl ProviderPreference {
    /// Whether the row carries a usable key.
    pub fn has_api_key(&self) -> bool {
        !self.encrypted_api_key.is_empty()
    }
}

/// Key-free view of a preference, safe to hand to UI code.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceSummary {
    pub user_id: String,
    pub provider: String,
    pub model: Option<String>,
    pub custom_endpoint: Option<String>,
    pub key_hint: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub connection_status: ConnectionStatus,
    pub request_count: u64,
    pub token_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&ProviderPreference> for PreferenceSummary {
    fn from(pref: &ProviderPreference) -> Self {
        PreferenceSummary {
            user_id: pref.user_id.clone(),
            provider: pref.provider.clone(),
            model: pref.model.clone(),
            custom_endpoint: pref.custom_endpoint.clone(),
            key_hint: pref.key_hint.clone(),
            temperature: pref.temperature,
            max_tokens: pref.max_tokens,
            connection_status: pref.connection_status,
            request_count: pref.request_count,
            token_count: pref.token_count,
            updated_at: pref.updated_at,
        }
    }
}

/// Cumulative usage counters for one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub request_count: u64,
    pub token_count: u64,
}

// ─────────────────────────────────────────────
// Normalized request / response
// ─────────────────────────────────────────────

/// Provider-agnostic inference request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl NormalizedRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        NormalizedRequest {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why generation stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    Error,
}

impl FinishReason {
    /// Map a provider-specific stop marker onto the normalized set.
    ///
    /// A missing marker means the provider finished normally.
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw.map(|r| r.to_ascii_lowercase()) {
            None => FinishReason::Stop,
            Some(r) => match r.as_str() {
                "stop" | "end_turn" | "stop_sequence" | "eos" | "finish_reason_unspecified" => {
                    FinishReason::Stop
                }
                "length" | "max_tokens" | "model_length" => FinishReason::Length,
                _ => FinishReason::Error,
            },
        }
    }
}

/// Token usage split as reported by the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    /// Build usage from the provider's counts; a missing total is the sum of the parts.
    pub fn new(input: u64, output: u64, total: Option<u64>) -> Self {
        TokenUsage {
            input,
            output,
            total: total.unwrap_or(input.saturating_add(output)),
        }
    }
}

/// Provider-agnostic inference result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub content: String,
    pub tokens_used: TokenUsage,
    pub model: String,
    pub provider: String,
    pub finish_reason: FinishReason,
}

// ─────────────────────────────────────────────
// Connection test result
// ─────────────────────────────────────────────

/// Outcome of a connection probe. Never persisted beyond the status column.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(latency_ms: u64) -> Self {
        ConnectionTestResult {
            success: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, latency_ms: Option<u64>) -> Self {
        ConnectionTestResult {
            success: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
