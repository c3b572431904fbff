//! Provider adapter trait: one implementation per wire format.
//!
//! An adapter turns a [`NormalizedRequest`] into the provider's HTTP payload,
//! attaches auth, and parses the reply back into a [`NormalizedResponse`].
//! Adapters are stateless apart from a pooled HTTP client and are shared
//! across users; everything per-user arrives in [`Credentials`].

use async_trait::async_trait;

use byok_core::error::Result;
use byok_core::registry::WireFormat;
use byok_core::types::{
    NormalizedRequest, NormalizedResponse, ProviderSettings, SecretKey, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};

/// Everything an adapter needs to call the provider for one user.
///
/// Built by the dispatcher for a single call and dropped afterwards.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Canonical provider id, echoed into the response.
    pub provider: String,
    pub api_key: SecretKey,
    /// Resolved model (user choice or registry default). May be empty for
    /// custom endpoints that ignore it.
    pub model: String,
    /// API base URL; for custom providers, the full endpoint URL.
    pub base_url: String,
    pub settings: ProviderSettings,
}

impl Credentials {
    pub fn new(
        provider: impl Into<String>,
        api_key: SecretKey,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            api_key,
            model: model.into(),
            base_url: base_url.into(),
            settings: ProviderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Sampling parameters with defaults applied.
pub(crate) fn sampling(request: &NormalizedRequest) -> (f64, u32) {
    (
        request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    )
}

/// Trait that every wire-format adapter implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The wire format this adapter speaks.
    fn wire_format(&self) -> WireFormat;

    /// Send one completion request.
    ///
    /// Fails with `Provider` on non-2xx, `RateLimit` when the provider signals
    /// quota exhaustion, and `Network` on transport failure. Error messages
    /// are sanitized before they are returned.
    async fn call(
        &self,
        request: &NormalizedRequest,
        credentials: &Credentials,
    ) -> Result<NormalizedResponse>;
}
