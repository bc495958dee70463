//! Credential redaction

use regex::Regex;
use scout_core::config::SanitizationConfig;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Normalized fragments that mark a field name as sensitive; `githubToken`,
/// `x-api-key` and `secret_key` all match
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "token",
    "password",
    "passwd",
    "secret",
    "apikey",
    "authorization",
    "cookie",
    "privatekey",
    "credential",
];

/// Bearer credentials embedded in free text
static BEARER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*").expect("bearer pattern is valid")
});

/// `key=value` and `key: value` credentials embedded in free text, such as
/// query strings and log lines
static KEY_VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b([a-z0-9_\-]*(?:api[_-]?key|token|secret|password|passwd|private[_-]?key))(\s*[:=]\s*)["']?[^"',\s}&]+"#,
    )
    .expect("key/value pattern is valid")
});

/// Redacts sensitive fields from JSON messages
#[derive(Debug, Clone)]
pub struct Sanitizer {
    fragments: HashSet<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl Sanitizer {
    /// Built-in fragments plus `extra_keys`
    pub fn new(extra_keys: &[String]) -> Self {
        let fragments = SENSITIVE_FRAGMENTS
            .iter()
            .map(|fragment| fragment.to_string())
            .chain(extra_keys.iter().map(|key| normalize(key)))
            .filter(|fragment| !fragment.is_empty())
            .collect();
        Self { fragments }
    }

    pub fn from_config(config: &SanitizationConfig) -> Self {
        Self::new(&config.extra_sensitive_keys)
    }

    /// Whether values stored under `key` are redacted.
    ///
    /// Matching ignores case, `_` and `-`, and accepts any key that contains
    /// a sensitive fragment.
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.fragments.iter().any(|fragment| key.contains(fragment.as_str()))
    }

    /// Return `message` with every sensitive value replaced
    pub fn sanitize_message(&self, message: Value) -> Value {
        match message {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| {
                        if self.is_sensitive(&key) && !value.is_null() {
                            (key, Value::String(REDACTED.to_string()))
                        } else {
                            (key, self.sanitize_message(value))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.sanitize_message(item)).collect())
            }
            Value::String(text) => Value::String(redact_inline(text)),
            other => other,
        }
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn redact_inline(text: String) -> String {
    let text = if BEARER_PATTERN.is_match(&text) {
        BEARER_PATTERN
            .replace_all(&text, format!("Bearer {}", REDACTED).as_str())
            .into_owned()
    } else {
        text
    };

    if KEY_VALUE_PATTERN.is_match(&text) {
        KEY_VALUE_PATTERN
            .replace_all(&text, format!("${{1}}${{2}}{}", REDACTED).as_str())
            .into_owned()
    } else {
        text
    }
}
