//! Provider registry: static capability specs for every supported provider.
//!
//! Each `ProviderCapability` describes what the rest of the system needs to
//! know about a provider: key format, models, which wire format its API
//! speaks, and feature/pricing metadata. Adding a provider is a new row here
//! (plus an adapter if it speaks a new wire format); nothing else branches on
//! provider ids.

use serde::Serialize;

use crate::error::{ByokError, Result};
use crate::types::ProviderId;

// ─────────────────────────────────────────────
// Capability descriptor
// ─────────────────────────────────────────────

/// Family of request/response JSON shapes a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WireFormat {
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "custom-openai-compatible")]
    CustomOpenAiCompatible,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::OpenAiCompatible => "openai-compatible",
            WireFormat::Anthropic => "anthropic",
            WireFormat::Google => "google",
            WireFormat::CustomOpenAiCompatible => "custom-openai-compatible",
        }
    }
}

/// What a well-formed key for this provider looks like.
#[derive(Clone, Debug, Serialize)]
pub struct KeyFormat {
    /// Literal prefix real keys start with (e.g. `"sk-ant-"`).
    pub prefix: Option<&'static str>,
    /// Keys shorter than this are suspicious (warning, not a hard failure).
    pub typical_min_len: usize,
}

/// One model offered by a provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub is_default: bool,
    pub context_window: u32,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFeatures {
    pub streaming: bool,
    pub vision: bool,
    pub long_context: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Budget,
    Standard,
    Premium,
    /// Self-hosted or unknown; billed by whoever runs the endpoint.
    Varies,
}

/// Immutable description of one provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapability {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub key_format: KeyFormat,
    /// Ordered list; exactly one entry is marked default (empty for `custom`).
    pub models: &'static [ModelInfo],
    pub wire_format: WireFormat,
    pub features: ProviderFeatures,
    pub pricing: PricingTier,
    /// Base URL used when neither the config nor the user overrides it.
    pub default_api_base: Option<&'static str>,
}

impl ProviderCapability {
    /// The model marked default, falling back to the first listed one.
    pub fn default_model(&self) -> Option<&'static ModelInfo> {
        self.models
            .iter()
            .find(|m| m.is_default)
            .or_else(|| self.models.first())
    }

    /// Whether `model` is in the catalog. Custom endpoints accept anything.
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m.id == model)
    }
}

// ─────────────────────────────────────────────
// Built-in providers
// ─────────────────────────────────────────────

/// Complete list of built-in provider capabilities.
pub static PROVIDERS: &[ProviderCapability] = &[
    ProviderCapability {
        id: ProviderId::OpenAi,
        display_name: "OpenAI",
        key_format: KeyFormat {
            prefix: Some("sk-"),
            typical_min_len: 40,
        },
        models: &[
            ModelInfo { id: "gpt-4o", display_name: "GPT-4o", is_default: true, context_window: 128_000 },
            ModelInfo { id: "gpt-4o-mini", display_name: "GPT-4o mini", is_default: false, context_window: 128_000 },
            ModelInfo { id: "gpt-4-turbo", display_name: "GPT-4 Turbo", is_default: false, context_window: 128_000 },
            ModelInfo { id: "gpt-3.5-turbo", display_name: "GPT-3.5 Turbo", is_default: false, context_window: 16_385 },
        ],
        wire_format: WireFormat::OpenAiCompatible,
        features: ProviderFeatures { streaming: true, vision: true, long_context: true },
        pricing: PricingTier::Premium,
        default_api_base: Some("https://api.openai.com/v1"),
    },
    ProviderCapability {
        id: ProviderId::Anthropic,
        display_name: "Anthropic Claude",
        key_format: KeyFormat {
            prefix: Some("sk-ant-"),
            typical_min_len: 40,
        },
        models: &[
            ModelInfo { id: "claude-3-5-sonnet-20241022", display_name: "Claude 3.5 Sonnet", is_default: true, context_window: 200_000 },
            ModelInfo { id: "claude-3-5-haiku-20241022", display_name: "Claude 3.5 Haiku", is_default: false, context_window: 200_000 },
            ModelInfo { id: "claude-3-opus-20240229", display_name: "Claude 3 Opus", is_default: false, context_window: 200_000 },
        ],
        wire_format: WireFormat::Anthropic,
        features: ProviderFeatures { streaming: true, vision: true, long_context: true },
        pricing: PricingTier::Premium,
        default_api_base: Some("https://api.anthropic.com/v1"),
    },
    ProviderCapability {
        id: ProviderId::Google,
        display_name: "Google Gemini",
        key_format: KeyFormat {
            prefix: Some("AIza"),
            typical_min_len: 39,
        },
        models: &[
            ModelInfo { id: "gemini-1.5-pro", display_name: "Gemini 1.5 Pro", is_default: true, context_window: 2_000_000 },
            ModelInfo { id: "gemini-1.5-flash", display_name: "Gemini 1.5 Flash", is_default: false, context_window: 1_000_000 },
            ModelInfo { id: "gemini-2.0-flash", display_name: "Gemini 2.0 Flash", is_default: false, context_window: 1_000_000 },
        ],
        wire_format: WireFormat::Google,
        features: ProviderFeatures { streaming: true, vision: true, long_context: true },
        pricing: PricingTier::Standard,
        default_api_base: Some("https://generativelanguage.googleapis.com/v1beta"),
    },
    ProviderCapability {
        id: ProviderId::DeepSeek,
        display_name: "DeepSeek",
        key_format: KeyFormat {
            prefix: Some("sk-"),
            typical_min_len: 30,
        },
        models: &[
            ModelInfo { id: "deepseek-chat", display_name: "DeepSeek Chat", is_default: true, context_window: 64_000 },
            ModelInfo { id: "deepseek-reasoner", display_name: "DeepSeek Reasoner", is_default: false, context_window: 64_000 },
        ],
        wire_format: WireFormat::OpenAiCompatible,
        features: ProviderFeatures { streaming: true, vision: false, long_context: false },
        pricing: PricingTier::Budget,
        default_api_base: Some("https://api.deepseek.com/v1"),
    },
    ProviderCapability {
        id: ProviderId::Mistral,
        display_name: "Mistral AI",
        key_format: KeyFormat {
            prefix: None,
            typical_min_len: 32,
        },
        models: &[
            ModelInfo { id: "mistral-large-latest", display_name: "Mistral Large", is_default: true, context_window: 128_000 },
            ModelInfo { id: "mistral-small-latest", display_name: "Mistral Small", is_default: false, context_window: 32_000 },
            ModelInfo { id: "open-mixtral-8x22b", display_name: "Mixtral 8x22B", is_default: false, context_window: 64_000 },
        ],
        wire_format: WireFormat::OpenAiCompatible,
        features: ProviderFeatures { streaming: true, vision: false, long_context: true },
        pricing: PricingTier::Standard,
        default_api_base: Some("https://api.mistral.ai/v1"),
    },
    ProviderCapability {
        id: ProviderId::Custom,
        display_name: "Custom endpoint",
        key_format: KeyFormat {
            prefix: None,
            typical_min_len: 0,
        },
        models: &[],
        wire_format: WireFormat::CustomOpenAiCompatible,
        features: ProviderFeatures { streaming: false, vision: false, long_context: false },
        pricing: PricingTier::Varies,
        default_api_base: None,
    },
];

/// Find a built-in capability by id or alias (`claude`, `gemini`).
pub fn find_capability(provider: &str) -> Option<&'static ProviderCapability> {
    let id = provider.parse::<ProviderId>().ok()?;
    PROVIDERS.iter().find(|c| c.id == id)
}

// ─────────────────────────────────────────────
// Registry instance
// ─────────────────────────────────────────────

/// Read-only provider catalog handed to the dispatcher at construction.
///
/// Built once at startup; all lookups are lock-free reads.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    providers: Vec<ProviderCapability>,
}

impl ProviderRegistry {
    /// Registry over an explicit list of capabilities.
    pub fn new(providers: Vec<ProviderCapability>) -> Self {
        Self { providers }
    }

    /// Registry with every built-in provider.
    pub fn builtin() -> Self {
        Self::new(PROVIDERS.to_vec())
    }

    pub fn list_providers(&self) -> &[ProviderCapability] {
        &self.providers
    }

    /// Resolve a provider id (aliases accepted) to its capability.
    ///
    /// `none`, unknown ids, and ids missing from this registry all fail with
    /// `UnsupportedProvider`.
    pub fn resolve(&self, provider: &str) -> Result<&ProviderCapability> {
        let id = provider.parse::<ProviderId>()?;
        self.providers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ByokError::UnsupportedProvider(provider.to_string()))
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.resolve(provider).is_ok()
    }

    /// Default model id for a provider, if it has a catalog.
    pub fn default_model(&self, provider: &str) -> Option<&'static str> {
        self.resolve(provider)
            .ok()
            .and_then(|c| c.default_model())
            .map(|m| m.id)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
