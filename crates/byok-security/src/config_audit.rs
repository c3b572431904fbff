//! Provider configuration audit.
//!
//! Produces human-readable findings; none of them block a save.

use url::{Host, Url};

use byok_core::types::ProviderConfig;

/// Inspect a submitted provider config for insecure or suspicious settings.
///
/// Returns an empty list for a config with nothing to report.
pub fn audit_provider_config(config: &ProviderConfig) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(endpoint) = config
        .custom_endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        audit_endpoint(endpoint, &mut issues);
    }

    let settings = &config.provider_settings;
    if settings.debug {
        issues.push(
            "Debug mode is enabled; provider responses may be written to application output"
                .to_string(),
        );
    }
    if settings.log_requests {
        issues.push(
            "Request logging is enabled; request metadata will be written to logs".to_string(),
        );
    }

    issues
}

fn audit_endpoint(endpoint: &str, issues: &mut Vec<String>) {
    let url = match Url::parse(endpoint) {
        Ok(url) => url,
        Err(e) => {
            issues.push(format!("Custom endpoint is not a valid URL ({e})"));
            return;
        }
    };

    if url.scheme() != "https" {
        issues.push(format!(
            "Custom endpoint does not use HTTPS (scheme \"{}\"); keys would travel unencrypted",
            url.scheme()
        ));
    }

    if url.host().is_some_and(|h| is_local_host(&h)) {
        issues.push(
            "Custom endpoint points to localhost; it will only work where that service runs"
                .to_string(),
        );
    }
}

fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
        Host::Ipv4(ip) => ip.is_loopback() || ip.is_unspecified(),
        Host::Ipv6(ip) => ip.is_loopback() || ip.is_unspecified(),
    }
}
