//! Secret redaction for error messages, log lines, and audit records.
//!
//! Each pattern keeps a short literal lead-in (`sk-`, `Bearer `, `api_key=`,
//! `"token":"`) so the reader can still tell what kind of credential was
//! there, and replaces the secret itself with `***`.

use std::sync::OnceLock;

use regex::Regex;

/// Fixed mask substituted for secret material.
pub const MASK: &str = "***";

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            // key=..., api_key=..., token=... in query strings and form bodies
            (
                r#"(?i)\b((?:api[_-]?key|key|access[_-]?token|token|secret)=)[^&\s"']+"#,
                "${1}***",
            ),
            // "api_key": "...", "token": "..." in echoed JSON bodies
            (
                r#"(?i)("(?:api[_-]?key|key|access[_-]?token|token|secret)"\s*:\s*")[^"]+"#,
                "${1}***",
            ),
            (r"(?i)\b(Bearer\s+)[A-Za-z0-9\-._~+/]+=*", "${1}***"),
            // provider-shaped keys anywhere in the text
            (r"\b(sk-ant-|sk-|AIza)[A-Za-z0-9_\-]{3,}", "${1}***"),
            // long opaque values following "key", "token" or "secret"
            (
                r"(?i)(\b(?:api[_-]?key|key|access[_-]?token|token|secret)[:\s]+)[A-Za-z0-9_\-]{20,}",
                "${1}***",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|pattern| Rule {
                pattern,
                replacement,
            })
        })
        .collect()
    })
}

/// Replace recognizable secrets in `message` with a masked lead-in.
///
/// ```
/// use byok_security::redact::sanitize_error;
///
/// assert_eq!(
///     sanitize_error("Authentication failed with key sk-1234567890abcdef"),
///     "Authentication failed with key sk-***"
/// );
/// ```
pub fn sanitize_error(message: &str) -> String {
    let mut out = message.to_string();
    for rule in rules() {
        if rule.pattern.is_match(&out) {
            out = rule
                .pattern
                .replace_all(&out, rule.replacement)
                .into_owned();
        }
    }
    out
}

/// Remove every literal occurrence of `secret` from `message`.
///
/// Pattern-based redaction can miss keys with unusual shapes; when the exact
/// key is known (adapter error paths) it is scrubbed verbatim as well.
pub fn scrub_secret(message: &str, secret: &str) -> String {
    if secret.len() < 4 || !message.contains(secret) {
        return message.to_string();
    }
    message.replace(secret, MASK)
}
