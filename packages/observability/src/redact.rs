//! Credential scrubbing for structured log fields.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Replacement written in place of a scrubbed value.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: [&str; 8] = [
    "password",
    "token",
    "id_token",
    "identity_token",
    "authorization",
    "secret",
    "cookie",
    "credential",
];

/// Scrub every field whose key or value looks like a credential.
pub fn redact_fields(fields: &mut BTreeMap<String, Value>) {
    for (key, value) in fields.iter_mut() {
        *value = redact_value(key, value);
    }
}

fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(raw) if looks_like_bearer(raw) => Value::String(REDACTED.to_string()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(key, v)).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|entry| lower.contains(entry))
}

/// Bearer headers and three-segment JWTs.
fn looks_like_bearer(raw: &str) -> bool {
    if raw.to_ascii_lowercase().starts_with("bearer ") {
        return true;
    }
    raw.len() > 40 && raw.matches('.').count() == 2 && !raw.contains(' ')
}
