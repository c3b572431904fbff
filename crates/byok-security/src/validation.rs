//! API key format validation.
//!
//! Hard rules (empty, too short, whitespace, placeholder text) make a key
//! invalid. Provider-specific rules (expected prefix, typical length) only
//! add warnings; whether a warning blocks a save is the dispatcher's call.

use serde::Serialize;

use byok_core::registry::find_capability;

/// Keys shorter than this are rejected for every provider.
pub const MIN_KEY_LENGTH: usize = 20;

/// Lower-cased fragments that only show up in copy-pasted sample keys.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "your_api_key",
    "your-api-key",
    "yourapikey",
    "api_key_here",
    "your_key_here",
    "placeholder",
    "xxxxxxxx",
    "<api",
];

/// Outcome of [`validate_api_key_format`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KeyValidation {
    pub valid: bool,
    /// Hard failures and soft warnings, in the order they were found.
    pub warnings: Vec<String>,
}

impl KeyValidation {
    pub fn is_clean(&self) -> bool {
        self.valid && self.warnings.is_empty()
    }
}

/// Check `key` against the provider-independent hard rules and the provider's
/// expected key shape.
///
/// `provider` may be any id or alias; unknown providers get the hard rules only.
pub fn validate_api_key_format(provider: &str, key: &str) -> KeyValidation {
    let mut valid = true;
    let mut warnings = Vec::new();

    if key.is_empty() {
        return KeyValidation {
            valid: false,
            warnings: vec!["API key is empty".to_string()],
        };
    }

    if key.chars().any(char::is_whitespace) {
        valid = false;
        warnings.push("API key contains whitespace".to_string());
    }

    let lower = key.to_lowercase();
    if PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
        valid = false;
        warnings.push("API key looks like a placeholder value".to_string());
    }

    let len = key.chars().count();
    if len < MIN_KEY_LENGTH {
        valid = false;
        warnings.push(format!(
            "API key is too short (length {len}, minimum {MIN_KEY_LENGTH})"
        ));
    }

    if let Some(cap) = find_capability(provider) {
        let format = &cap.key_format;
        if let Some(prefix) = format.prefix {
            if !key.starts_with(prefix) {
                warnings.push(format!(
                    "{} keys usually start with the prefix \"{}\"",
                    cap.display_name, prefix
                ));
            }
        }
        if format.typical_min_len > 0 && len < format.typical_min_len {
            warnings.push(format!(
                "{} keys are usually at least {} characters; this key has length {}",
                cap.display_name, format.typical_min_len, len
            ));
        }
    }

    KeyValidation { valid, warnings }
}
