//! Configuration schema.
//!
//! Hierarchy: `ByokConfig` → `VaultConfig`, `DispatchConfig`, per-provider
//! `ProviderEndpointConfig`, `AuditConfig`, `StoreConfig`, `LoggingConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.byok/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ByokConfig {
    pub vault: VaultConfig,
    pub dispatch: DispatchConfig,
    /// Per-provider overrides keyed by canonical provider id.
    pub providers: HashMap<String, ProviderEndpointConfig>,
    pub audit: AuditConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl ByokConfig {
    /// Base URL overrides for every provider that sets one.
    pub fn api_base_overrides(&self) -> HashMap<String, String> {
        self.providers
            .iter()
            .filter_map(|(name, cfg)| cfg.api_base.clone().map(|base| (name.clone(), base)))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Vault
// ─────────────────────────────────────────────

/// Where the process-wide master secret comes from.
///
/// The secret itself never lives in the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Environment variable holding the master secret.
    pub secret_env: String,
    /// Secrets shorter than this are refused at startup.
    pub min_secret_length: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_env: "BYOK_ENCRYPTION_SECRET".to_string(),
            min_secret_length: 16,
        }
    }
}

impl VaultConfig {
    /// Read the master secret from the configured env var.
    pub fn read_secret(&self) -> Option<String> {
        std::env::var(&self.secret_env).ok().filter(|s| !s.is_empty())
    }
}

// ─────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────

/// Dispatcher behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
    /// Refuse to save keys that fail hard format validation.
    pub strict_validation: bool,
    /// Upper bound for a `generateResponse` network call.
    pub request_timeout_secs: u64,
    /// Upper bound for a connection probe.
    pub probe_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strict_validation: false,
            request_timeout_secs: 60,
            probe_timeout_secs: 15,
        }
    }
}

impl DispatchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Operator-level override for one provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderEndpointConfig {
    /// Custom API base URL (overrides the registry default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

// ─────────────────────────────────────────────
// Audit / store / logging
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Append-only JSON lines file.
    pub log_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.byok/audit.jsonl".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// JSON file backing the preference store.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "~/.byok/preferences.json".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "byok=info,warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ByokConfig::default();
        assert_eq!(config.vault.secret_env, "BYOK_ENCRYPTION_SECRET");
        assert!(!config.dispatch.strict_validation);
        assert_eq!(config.dispatch.probe_timeout(), Duration::from_secs(15));
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(60));
        assert!(config.audit.enabled);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(ByokConfig::default()).unwrap();
        assert!(json["dispatch"].get("strictValidation").is_some());
        assert!(json["dispatch"].get("strict_validation").is_none());
        assert!(json["vault"].get("secretEnv").is_some());
    }

    #[test]
    fn test_api_base_overrides() {
        let mut config = ByokConfig::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderEndpointConfig {
                api_base: Some("https://proxy.internal/v1".to_string()),
            },
        );
        config
            .providers
            .insert("anthropic".to_string(), ProviderEndpointConfig::default());

        let overrides = config.api_base_overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides["openai"], "https://proxy.internal/v1");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ByokConfig =
            serde_json::from_str(r#"{"dispatch": {"strictValidation": true}}"#).unwrap();
        assert!(config.dispatch.strict_validation);
        assert_eq!(config.dispatch.probe_timeout_secs, 15);
        assert_eq!(config.store.path, "~/.byok/preferences.json");
    }
}
