//! Per-user provider dispatch.
//!
//! `ProviderService` holds no per-user state. Every call loads the user's
//! preference, opens the key, resolves the adapter through the registry's
//! wire format, and runs the network call in a spawned task so usage
//! counters, status updates and audit events land even if the caller stops
//! waiting.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use byok_core::config::ByokConfig;
use byok_core::error::{ByokError, Result};
use byok_core::registry::{ProviderCapability, ProviderRegistry};
use byok_core::store::{JsonFilePreferenceStore, PreferenceStore};
use byok_core::types::{
    ConnectionStatus, ConnectionTestResult, EncryptedBlob, NormalizedRequest, NormalizedResponse,
    PreferenceSummary, ProviderConfig, ProviderId, ProviderPreference, SecretKey, UsageStats,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_TOKENS_RANGE, TEMPERATURE_RANGE,
};
use byok_core::utils::expand_home;
use byok_providers::{AdapterSet, Credentials, ProviderAdapter};
use byok_security::{
    audit_provider_config, mask_api_key, sanitize_error, scrub_secret, validate_api_key_format,
    CredentialVault, KeyValidation, SecurityAuditor,
};

/// Prompt sent by connection probes.
pub const PROBE_PROMPT: &str = "Say OK";
/// Output budget for connection probes.
pub const PROBE_MAX_TOKENS: u32 = 10;

// ─────────────────────────────────────────────
// Options and reports
// ─────────────────────────────────────────────

/// Dispatcher knobs, usually taken from the `dispatch` and `providers`
/// config sections.
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    /// Refuse to save keys that fail hard format rules.
    pub strict_validation: bool,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    /// Canonical provider id → API base URL.
    pub api_base_overrides: HashMap<String, String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            strict_validation: false,
            request_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(15),
            api_base_overrides: HashMap::new(),
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &ByokConfig) -> Self {
        Self {
            strict_validation: config.dispatch.strict_validation,
            request_timeout: config.dispatch.request_timeout(),
            probe_timeout: config.dispatch.probe_timeout(),
            api_base_overrides: config.api_base_overrides(),
        }
    }
}

/// Outcome of a successful save.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    /// Key format check result; may be invalid when strict validation is off.
    pub validation: KeyValidation,
    /// Insecure settings found in the saved config.
    pub config_issues: Vec<String>,
    /// `false` when an existing preference for the same provider was replaced.
    pub created: bool,
    pub summary: PreferenceSummary,
}

/// Everything needed to make one call for one user.
struct ResolvedCall {
    adapter: Arc<dyn ProviderAdapter>,
    credentials: Credentials,
    temperature: f64,
    max_tokens: u32,
}

fn storage_error(e: anyhow::Error) -> ByokError {
    ByokError::Storage(sanitize_error(&format!("{e:#}")))
}

fn join_error(e: tokio::task::JoinError) -> ByokError {
    ByokError::Internal(format!("dispatch task failed: {e}"))
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

// ─────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────

/// The dispatcher: credential storage, routing, and connection probes.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct ProviderService {
    store: Arc<dyn PreferenceStore>,
    registry: Arc<ProviderRegistry>,
    adapters: AdapterSet,
    vault: Arc<CredentialVault>,
    auditor: SecurityAuditor,
    options: Arc<ServiceOptions>,
}

impl ProviderService {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        registry: ProviderRegistry,
        adapters: AdapterSet,
        vault: CredentialVault,
        auditor: SecurityAuditor,
        options: ServiceOptions,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            adapters,
            vault: Arc::new(vault),
            auditor,
            options: Arc::new(options),
        }
    }

    /// Wire a service from config: file store, JSONL audit trail, vault
    /// secret from the environment, built-in registry and adapters.
    pub async fn from_config(config: &ByokConfig) -> anyhow::Result<Self> {
        let vault = CredentialVault::from_config(&config.vault)?;
        let store = JsonFilePreferenceStore::open(expand_home(&config.store.path)).await?;
        let auditor = SecurityAuditor::from_config(&config.audit).await?;
        let options = ServiceOptions::from_config(config);
        let adapters = AdapterSet::default_set(options.request_timeout);
        let registry = ProviderRegistry::builtin();

        info!(
            providers = registry.list_providers().len(),
            audit = auditor.is_enabled(),
            strict = options.strict_validation,
            "provider service ready"
        );

        Ok(Self::new(
            Arc::new(store),
            registry,
            adapters,
            vault,
            auditor,
            options,
        ))
    }

    pub fn list_providers(&self) -> &[ProviderCapability] {
        self.registry.list_providers()
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    // ── Preferences ─────────────────────────

    /// Validate, encrypt and persist the user's provider config.
    ///
    /// Re-saving keeps `created_at` and the usage counters and resets the
    /// connection status to `untested`.
    pub async fn save_preferences(
        &self,
        user_id: &str,
        config: &ProviderConfig,
    ) -> Result<SaveReport> {
        let capability = self.check_config(config)?;
        let provider = capability.id.as_str();

        let validation = validate_api_key_format(provider, &config.api_key);
        if !validation.valid {
            if self.options.strict_validation {
                return Err(ByokError::Validation(validation.warnings.join("; ")));
            }
            warn!(
                user_id,
                provider,
                warnings = ?validation.warnings,
                "saving API key that failed format validation"
            );
        }

        let config_issues = audit_provider_config(config);
        for issue in &config_issues {
            warn!(user_id, provider, "{issue}");
        }

        let encrypted_api_key = if config.api_key.is_empty() {
            EncryptedBlob::default()
        } else {
            match self.vault.encrypt(&config.api_key, user_id) {
                Ok(blob) => blob,
                Err(e) => {
                    self.auditor
                        .log_encryption_failed(user_id, &e.to_string())
                        .await;
                    return Err(e);
                }
            }
        };

        let existing = self.store.load(user_id).await.map_err(storage_error)?;
        let now = Utc::now();
        let preference = ProviderPreference {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            encrypted_api_key,
            key_hint: (!config.api_key.is_empty()).then(|| mask_api_key(&config.api_key)),
            model: non_blank(config.model.as_ref())
                .or_else(|| capability.default_model().map(|m| m.id.to_string())),
            custom_endpoint: if capability.id == ProviderId::Custom {
                non_blank(config.custom_endpoint.as_ref())
            } else {
                None
            },
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            provider_settings: config.provider_settings.clone(),
            is_active: true,
            request_count: existing.as_ref().map_or(0, |p| p.request_count),
            token_count: existing.as_ref().map_or(0, |p| p.token_count),
            connection_status: ConnectionStatus::Untested,
            created_at: existing.as_ref().map_or(now, |p| p.created_at),
            updated_at: now,
        };
        let summary = PreferenceSummary::from(&preference);

        self.store.upsert(preference).await.map_err(storage_error)?;

        let updated = existing.is_some_and(|p| p.provider == provider);
        if updated {
            self.auditor.log_api_key_updated(user_id, provider).await;
        } else {
            self.auditor.log_api_key_created(user_id, provider).await;
        }
        info!(user_id, provider, updated, "saved provider preference");

        Ok(SaveReport {
            validation,
            config_issues,
            created: !updated,
            summary,
        })
    }

    /// Boolean form of [`save_preferences`](Self::save_preferences); any
    /// failure is logged and reported as `false`.
    pub async fn save_user_preferences(&self, user_id: &str, config: &ProviderConfig) -> bool {
        match self.save_preferences(user_id, config).await {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id, code = e.code(), error = %e, "failed to save provider preference");
                false
            }
        }
    }

    /// Key-free view of the user's preference.
    pub async fn get_user_preferences(&self, user_id: &str) -> Result<Option<PreferenceSummary>> {
        let pref = self.store.load(user_id).await.map_err(storage_error)?;
        Ok(pref.as_ref().map(PreferenceSummary::from))
    }

    /// Remove the user's preference. Returns `false` if there was none.
    pub async fn delete_user_preferences(&self, user_id: &str) -> Result<bool> {
        let Some(existing) = self.store.load(user_id).await.map_err(storage_error)? else {
            return Ok(false);
        };
        let removed = self.store.delete(user_id).await.map_err(storage_error)?;
        if removed {
            self.auditor
                .log_api_key_deleted(user_id, &existing.provider)
                .await;
            info!(user_id, provider = %existing.provider, "deleted provider preference");
        }
        Ok(removed)
    }

    pub async fn usage(&self, user_id: &str) -> Result<Option<UsageStats>> {
        let pref = self.store.load(user_id).await.map_err(storage_error)?;
        Ok(pref.map(|p| UsageStats {
            request_count: p.request_count,
            token_count: p.token_count,
        }))
    }

    // ── Inference ───────────────────────────

    /// Send `request` to the user's configured provider.
    ///
    /// Unset sampling parameters are filled from the preference. Errors from
    /// the adapter are returned as-is; nothing is retried here.
    pub async fn generate_response(
        &self,
        user_id: &str,
        request: NormalizedRequest,
    ) -> Result<NormalizedResponse> {
        let Some(pref) = self.store.load(user_id).await.map_err(storage_error)? else {
            return Err(ByokError::NoProviderConfigured);
        };
        let resolved = self.resolve_preference(user_id, &pref).await?;

        let mut request = request;
        request.temperature = request.temperature.or(Some(resolved.temperature));
        request.max_tokens = request.max_tokens.or(Some(resolved.max_tokens));

        let this = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move { this.dispatch(&user_id, &request, resolved).await })
            .await
            .map_err(join_error)?
    }

    async fn dispatch(
        &self,
        user_id: &str,
        request: &NormalizedRequest,
        resolved: ResolvedCall,
    ) -> Result<NormalizedResponse> {
        let provider = resolved.credentials.provider.as_str();
        let timeout = self.options.request_timeout;
        let call = resolved.adapter.call(request, &resolved.credentials);

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(user_id, provider, code = e.code(), error = %e, "provider call failed");
                return Err(e);
            }
            Err(_) => {
                warn!(user_id, provider, timeout_secs = timeout.as_secs(), "provider call timed out");
                return Err(ByokError::Timeout(timeout));
            }
        };

        let tokens = response.tokens_used.total;
        match self.store.record_usage(user_id, tokens).await {
            Ok(true) => {}
            Ok(false) => warn!(user_id, "preference removed before usage was recorded"),
            Err(e) => warn!(user_id, error = %e, "failed to record usage"),
        }
        debug!(
            user_id,
            provider,
            model = %response.model,
            tokens,
            "completion dispatched"
        );
        Ok(response)
    }

    // ── Connection probes ───────────────────

    /// Probe the provider with a minimal request.
    ///
    /// With `config`, the unsaved config is probed and nothing is persisted.
    /// Without it, the stored preference is probed and its connection status
    /// moves through `testing` to the outcome. Pre-flight failures (no key,
    /// bad config, undecryptable key) are returned as errors; failures of
    /// the probe itself come back as an unsuccessful result.
    pub async fn test_connection(
        &self,
        user_id: &str,
        config: Option<&ProviderConfig>,
    ) -> Result<ConnectionTestResult> {
        let (resolved, stored) = match config {
            Some(config) => (self.resolve_config(config)?, false),
            None => match self.store.load(user_id).await.map_err(storage_error)? {
                Some(pref) if pref.has_api_key() => {
                    (self.resolve_preference(user_id, &pref).await?, true)
                }
                _ => return Err(ByokError::NoApiKeyConfigured),
            },
        };

        if stored {
            self.set_status(user_id, ConnectionStatus::Testing).await;
        }

        let this = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move { this.probe(&user_id, resolved, stored).await })
            .await
            .map_err(join_error)
    }

    async fn probe(
        &self,
        user_id: &str,
        resolved: ResolvedCall,
        stored: bool,
    ) -> ConnectionTestResult {
        let request = NormalizedRequest::new(PROBE_PROMPT)
            .with_temperature(0.0)
            .with_max_tokens(PROBE_MAX_TOKENS);
        let credentials = &resolved.credentials;
        let provider = credentials.provider.as_str();
        let timeout = self.options.probe_timeout;

        let started = Instant::now();
        let call = resolved.adapter.call(&request, credentials);
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ByokError::Timeout(timeout)),
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(_) => {
                if stored {
                    self.set_status(user_id, ConnectionStatus::Connected).await;
                }
                info!(user_id, provider, latency_ms, "connection test passed");
                ConnectionTestResult::ok(latency_ms)
            }
            Err(e) => {
                let status = match &e {
                    ByokError::RateLimit(_) => ConnectionStatus::QuotaExceeded,
                    _ => ConnectionStatus::Error,
                };
                if stored {
                    self.set_status(user_id, status).await;
                }
                let message = sanitize_error(&scrub_secret(
                    &e.to_string(),
                    credentials.api_key.expose(),
                ));
                self.auditor
                    .log_connection_test_failed(user_id, provider, &message)
                    .await;
                warn!(user_id, provider, latency_ms, error = %message, "connection test failed");
                ConnectionTestResult::failed(message, Some(latency_ms))
            }
        }
    }

    async fn set_status(&self, user_id: &str, status: ConnectionStatus) {
        match self.store.set_connection_status(user_id, status).await {
            Ok(true) => debug!(user_id, status = ?status, "connection status updated"),
            Ok(false) => debug!(user_id, "no preference to update status on"),
            Err(e) => warn!(user_id, error = %e, "failed to update connection status"),
        }
    }

    // ── Resolution ──────────────────────────

    /// Provider, ranges and endpoint checks shared by save and ad-hoc probes.
    fn check_config(&self, config: &ProviderConfig) -> Result<&ProviderCapability> {
        let id: ProviderId = config.provider.parse()?;
        if id == ProviderId::Unset {
            return Err(ByokError::InvalidConfig(
                "provider \"none\" cannot be configured; delete the preference instead".to_string(),
            ));
        }
        let capability = self.registry.resolve(id.as_str())?;

        if let Some(temperature) = config.temperature {
            let (min, max) = TEMPERATURE_RANGE;
            if !(min..=max).contains(&temperature) {
                return Err(ByokError::InvalidConfig(format!(
                    "temperature must be between {min} and {max}"
                )));
            }
        }
        if let Some(max_tokens) = config.max_tokens {
            let (min, max) = MAX_TOKENS_RANGE;
            if !(min..=max).contains(&max_tokens) {
                return Err(ByokError::InvalidConfig(format!(
                    "maxTokens must be between {min} and {max}"
                )));
            }
        }
        if id == ProviderId::Custom && non_blank(config.custom_endpoint.as_ref()).is_none() {
            return Err(ByokError::InvalidConfig(
                "custom provider requires a customEndpoint".to_string(),
            ));
        }
        Ok(capability)
    }

    fn adapter_for(&self, capability: &ProviderCapability) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters.get(capability.wire_format).ok_or_else(|| {
            ByokError::UnsupportedProvider(format!(
                "{} (no adapter for {})",
                capability.id,
                capability.wire_format.as_str()
            ))
        })
    }

    /// Custom providers call their endpoint; everyone else uses the
    /// configured override or the registry default.
    fn base_url_for(
        &self,
        capability: &ProviderCapability,
        custom_endpoint: Option<&String>,
    ) -> String {
        if capability.id == ProviderId::Custom {
            return custom_endpoint.cloned().unwrap_or_default();
        }
        self.options
            .api_base_overrides
            .get(capability.id.as_str())
            .cloned()
            .or_else(|| capability.default_api_base.map(str::to_string))
            .unwrap_or_default()
    }

    fn model_for(capability: &ProviderCapability, model: Option<&String>) -> String {
        non_blank(model)
            .or_else(|| capability.default_model().map(|m| m.id.to_string()))
            .unwrap_or_default()
    }

    /// Resolve an unsaved config for an ad-hoc probe.
    fn resolve_config(&self, config: &ProviderConfig) -> Result<ResolvedCall> {
        let capability = self.check_config(config)?;
        if config.api_key.is_empty() {
            return Err(ByokError::NoApiKeyConfigured);
        }
        let adapter = self.adapter_for(capability)?;
        let credentials = Credentials::new(
            capability.id.as_str(),
            SecretKey::new(config.api_key.clone()),
            Self::model_for(capability, config.model.as_ref()),
            self.base_url_for(capability, config.custom_endpoint.as_ref()),
        )
        .with_settings(config.provider_settings.clone());

        Ok(ResolvedCall {
            adapter,
            credentials,
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Resolve a stored preference, decrypting its key.
    async fn resolve_preference(
        &self,
        user_id: &str,
        pref: &ProviderPreference,
    ) -> Result<ResolvedCall> {
        if matches!(pref.provider.parse::<ProviderId>(), Ok(ProviderId::Unset)) {
            return Err(ByokError::NoProviderConfigured);
        }
        let capability = match self.registry.resolve(&pref.provider) {
            Ok(capability) => capability,
            Err(e) => {
                let metadata =
                    BTreeMap::from([("provider".to_string(), pref.provider.clone())]);
                self.auditor
                    .log_suspicious_activity(
                        user_id,
                        &format!("Stored provider {} is not supported", pref.provider),
                        metadata,
                    )
                    .await;
                return Err(e);
            }
        };
        let adapter = self.adapter_for(capability)?;

        if !pref.has_api_key() {
            return Err(ByokError::NoApiKeyConfigured);
        }
        let api_key = match self.vault.decrypt(&pref.encrypted_api_key, user_id) {
            Ok(key) => key,
            Err(e) => {
                self.auditor
                    .log_decryption_failed(user_id, &e.to_string())
                    .await;
                return Err(e);
            }
        };

        let credentials = Credentials::new(
            capability.id.as_str(),
            api_key,
            Self::model_for(capability, pref.model.as_ref()),
            self.base_url_for(capability, pref.custom_endpoint.as_ref()),
        )
        .with_settings(pref.provider_settings.clone());

        Ok(ResolvedCall {
            adapter,
            credentials,
            temperature: pref.temperature,
            max_tokens: pref.max_tokens,
        })
    }
}

impl std::fmt::Debug for ProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderService")
            .field("providers", &self.registry.list_providers().len())
            .field("adapters", &self.adapters)
            .field("audit", &self.auditor.is_enabled())
            .field("options", &self.options)
            .finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
