//! Dispatch layer for byok.
//!
//! - [`service::ProviderService`]: saves per-user provider configs, routes
//!   completions to the right adapter, tracks usage and connection status
//! - [`tester::ConnectionTester`]: probe façade that always yields a result

pub mod service;
pub mod tester;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use service::{ProviderService, SaveReport, ServiceOptions, PROBE_MAX_TOKENS, PROBE_PROMPT};
pub use tester::ConnectionTester;
