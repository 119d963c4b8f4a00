// Debug payload redaction
//
// Applied to request/response bodies before they reach the debug log.

use serde_json::{Map, Value};

const REDACTED: &str = "<REDACTED>";

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "authorization",
    "api_key",
    "password",
    "token",
    "secret",
    "cookie",
];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}...(truncated {} chars)", kept, count - max_chars)
}

/// Redact secrets, summarize inline base64 and truncate long strings.
pub fn redact_for_log(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let redacted = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else if key == "data" {
                    match v {
                        Value::String(s) => {
                            Value::String(format!("<base64 len={}>", s.chars().count()))
                        }
                        other => redact_for_log(other, max_chars),
                    }
                } else {
                    redact_for_log(v, max_chars)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_for_log(item, max_chars))
                .collect(),
        ),
        Value::String(s) => Value::String(truncate(s, max_chars)),
        other => other.clone(),
    }
}

/// Redacted, compact JSON text for logging.
pub fn redacted_json(value: &Value, max_chars: usize) -> String {
    serde_json::to_string(&redact_for_log(value, max_chars)).unwrap_or_default()
}
