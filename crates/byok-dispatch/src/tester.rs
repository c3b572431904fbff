//! Connection probe façade for UI and health-check callers.

use tracing::debug;

use byok_core::types::{ConnectionTestResult, ProviderConfig};
use byok_security::sanitize_error;

use crate::service::ProviderService;

/// Runs connection probes and always answers with a result.
#[derive(Clone, Debug)]
pub struct ConnectionTester {
    service: ProviderService,
}

impl ConnectionTester {
    pub fn new(service: ProviderService) -> Self {
        Self { service }
    }

    /// Probe the user's stored preference, or `config` when given.
    ///
    /// Pre-flight errors (no key, bad config) become a failed result
    /// without latency.
    pub async fn test(
        &self,
        user_id: &str,
        config: Option<&ProviderConfig>,
    ) -> ConnectionTestResult {
        match self.service.test_connection(user_id, config).await {
            Ok(result) => result,
            Err(e) => {
                debug!(user_id, code = e.code(), "connection test rejected before probing");
                ConnectionTestResult::failed(sanitize_error(&e.to_string()), None)
            }
        }
    }
}
