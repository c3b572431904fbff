//! Error taxonomy for the credential / dispatch layer.
//!
//! Every message carried here is expected to be sanitized already; the
//! adapters and the dispatcher scrub provider text before constructing these.

use std::time::Duration;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ByokError>;

/// Errors surfaced by byok operations.
#[derive(Debug, Error)]
pub enum ByokError {
    /// API key format rejected (only fatal when strict validation is on).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("No API key configured")]
    NoApiKeyConfigured,

    #[error("No AI provider configured")]
    NoProviderConfigured,

    /// Stored or requested provider id is not in the registry.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Transport failure (DNS, connect, TLS, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the provider.
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider signalled quota exhaustion; callers decide on backoff.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ByokError {
    /// Whether the caller may reasonably try the same call again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ByokError::Network(_) | ByokError::RateLimit(_) | ByokError::Timeout(_)
        )
    }

    /// Stable machine-readable code for API responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            ByokError::Validation(_) => "validation_error",
            ByokError::InvalidConfig(_) => "invalid_config",
            ByokError::EncryptionFailed(_) => "encryption_failed",
            ByokError::DecryptionFailed(_) => "decryption_failed",
            ByokError::NoApiKeyConfigured => "no_api_key_configured",
            ByokError::NoProviderConfigured => "no_provider_configured",
            ByokError::UnsupportedProvider(_) => "unsupported_provider",
            ByokError::Network(_) => "network_error",
            ByokError::Provider { .. } => "provider_error",
            ByokError::RateLimit(_) => "rate_limit",
            ByokError::Timeout(_) => "timeout",
            ByokError::Storage(_) => "storage_error",
            ByokError::Internal(_) => "internal_error",
        }
    }
}
