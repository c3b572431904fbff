//! Core layer for byok (bring-your-own-key AI provider dispatch).
//!
//! # Architecture
//!
//! - [`types`]: provider ids, stored preferences, normalized request/response
//! - [`error::ByokError`]: error taxonomy shared by every crate
//! - [`registry`]: static capability specs for the supported providers
//! - [`config`]: `~/.byok/config.json` + `BYOK_*` env overrides
//! - [`store::PreferenceStore`]: persistence contract plus memory/file stores
//! - [`logging::init_logging`]: tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod store;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use error::{ByokError, Result};
pub use registry::{ProviderCapability, ProviderRegistry, WireFormat, PROVIDERS};
pub use store::PreferenceStore;
pub use types::{
    ConnectionStatus, ConnectionTestResult, EncryptedBlob, FinishReason, NormalizedRequest,
    NormalizedResponse, PreferenceSummary, ProviderConfig, ProviderId, ProviderPreference,
    ProviderSettings, RequestFormat, SecretKey, TokenUsage, UsageStats,
};
