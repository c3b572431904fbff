//! Security layer for byok.
//!
//! - [`vault::CredentialVault`]: per-user AES-256-GCM encryption of API keys
//! - [`validation`]: API key format checks
//! - [`config_audit`]: insecure provider config detection
//! - [`redact`]: secret scrubbing for errors and logs
//! - [`audit::SecurityAuditor`]: append-only audit trail with pluggable sinks

pub mod audit;
pub mod config_audit;
pub mod redact;
pub mod validation;
pub mod vault;

// Re-export main types for convenience
pub use audit::{
    verify_chain, AuditEvent, AuditEventType, AuditSeverity, AuditSink, JsonlAuditSink,
    MemoryAuditSink, SecurityAuditor,
};
pub use config_audit::audit_provider_config;
pub use redact::{sanitize_error, scrub_secret};
pub use validation::{validate_api_key_format, KeyValidation};
pub use vault::{mask_api_key, CredentialVault};
