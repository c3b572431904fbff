//! Config loader: reads `~/.byok/config.json`, normalizes provider aliases,
//! and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `ByokConfig::default()`)
//! 2. JSON file at `~/.byok/config.json`
//! 3. Environment variables `BYOK_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{ByokConfig, ProviderEndpointConfig};
use crate::registry::PROVIDERS;
use crate::types::ProviderId;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `ByokConfig::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> ByokConfig {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> ByokConfig {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(ByokConfig::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(ByokConfig::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(ByokConfig::default());
        }
    };

    normalize_provider_keys(&mut raw);

    let config: ByokConfig = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(ByokConfig::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &ByokConfig, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Rename alias provider sections to their canonical ids.
///
/// `providers.claude` → `providers.anthropic`, `providers.gemini` → `providers.google`.
/// An existing canonical section wins over the alias.
fn normalize_provider_keys(raw: &mut serde_json::Value) {
    let Some(providers) = raw.get_mut("providers").and_then(|p| p.as_object_mut()) else {
        return;
    };

    let aliases: Vec<String> = providers
        .keys()
        .filter(|name| {
            name.parse::<ProviderId>()
                .map(|id| id.as_str() != name.as_str())
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    for alias in aliases {
        let Ok(id) = alias.parse::<ProviderId>() else {
            continue;
        };
        if let Some(section) = providers.remove(&alias) {
            if providers.contains_key(id.as_str()) {
                warn!("Ignoring providers.{alias}: providers.{} is also set", id.as_str());
            } else {
                debug!("Normalized providers.{alias} → providers.{}", id.as_str());
                providers.insert(id.as_str().to_string(), section);
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `BYOK_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `BYOK_VAULT__SECRET_ENV` → `vault.secret_env`
/// - `BYOK_DISPATCH__STRICT_VALIDATION` → `dispatch.strict_validation`
/// - `BYOK_DISPATCH__REQUEST_TIMEOUT_SECS` → `dispatch.request_timeout_secs`
/// - `BYOK_DISPATCH__PROBE_TIMEOUT_SECS` → `dispatch.probe_timeout_secs`
/// - `BYOK_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `BYOK_AUDIT__ENABLED` / `BYOK_AUDIT__LOG_PATH`
/// - `BYOK_STORE__PATH`
/// - `BYOK_LOGGING__FILTER` / `BYOK_LOGGING__JSON`
fn apply_env_overrides(mut config: ByokConfig) -> ByokConfig {
    if let Ok(val) = std::env::var("BYOK_VAULT__SECRET_ENV") {
        config.vault.secret_env = val;
    }

    if let Ok(val) = std::env::var("BYOK_DISPATCH__STRICT_VALIDATION") {
        config.dispatch.strict_validation = parse_bool(&val);
    }
    if let Ok(val) = std::env::var("BYOK_DISPATCH__REQUEST_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.dispatch.request_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("BYOK_DISPATCH__PROBE_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.dispatch.probe_timeout_secs = n;
        }
    }

    for cap in PROVIDERS {
        let name = cap.id.as_str();
        let var = format!("BYOK_PROVIDERS__{}__API_BASE", name.to_uppercase());
        if let Ok(val) = std::env::var(var) {
            config
                .providers
                .entry(name.to_string())
                .or_insert_with(ProviderEndpointConfig::default)
                .api_base = Some(val);
        }
    }

    if let Ok(val) = std::env::var("BYOK_AUDIT__ENABLED") {
        config.audit.enabled = parse_bool(&val);
    }
    if let Ok(val) = std::env::var("BYOK_AUDIT__LOG_PATH") {
        config.audit.log_path = val;
    }
    if let Ok(val) = std::env::var("BYOK_STORE__PATH") {
        config.store.path = val;
    }
    if let Ok(val) = std::env::var("BYOK_LOGGING__FILTER") {
        config.logging.filter = val;
    }
    if let Ok(val) = std::env::var("BYOK_LOGGING__JSON") {
        config.logging.json = parse_bool(&val);
    }

    config
}

fn parse_bool(val: &str) -> bool {
    val == "true" || val == "1"
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
