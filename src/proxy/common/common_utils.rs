// Shared JSON helpers used by the request, response and streaming mappers

use serde_json::{Map, Value};

/// Recursively drop `null` map entries and `null` list items.
///
/// Some clients treat a null tool argument as a literal value ("search in
/// null"), so tool inputs are pruned before they are handed back.
pub fn remove_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), remove_nulls(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(remove_nulls)
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Whether a value carries visible text once rendered.
pub fn is_non_whitespace_text(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
        other => !other.to_string().trim().is_empty(),
    }
}

/// Render a JSON value as plain text. Strings are returned without quotes.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Human readable message for an error, never blank.
///
/// Some timeout errors render as an empty string; fall back to the short type
/// name of the error so the client always gets something to read.
pub fn describe_error<E: std::fmt::Display + ?Sized>(err: &E) -> String {
    let msg = err.to_string();
    if !msg.trim().is_empty() {
        return msg;
    }
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
