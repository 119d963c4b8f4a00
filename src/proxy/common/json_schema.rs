// JSON-Schema cleanup for upstream function declarations
//
// The upstream accepts an OpenAPI-ish subset: no references, no combinators,
// single `type` strings with an optional `nullable` flag.

use serde_json::{Map, Value};

/// Keys the upstream rejects outright.
const UNSUPPORTED_KEYS: &[&str] = &["$schema", "$id", "$ref", "oneOf", "anyOf", "allOf"];

/// Definition tables. Nothing references them once `$ref` is gone.
const DEFINITION_KEYS: &[&str] = &["$defs", "definitions"];

/// Keywords whose value is a map of name → sub-schema.
const SCHEMA_MAP_KEYS: &[&str] = &["properties", "patternProperties", "dependentSchemas"];

/// Validation keywords the upstream ignores. They stay in the schema but are
/// also copied into a synthesized description.
const VALIDATION_KEYS: &[&str] = &[
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minProperties",
    "maxProperties",
];

/// Clean a tool input schema. Non-object values pass through unchanged.
pub fn clean_json_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(clean_object(map)),
        other => other.clone(),
    }
}

fn clean_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    let mut constraints: Vec<String> = Vec::new();

    for (key, value) in map {
        if UNSUPPORTED_KEYS.contains(&key.as_str()) || DEFINITION_KEYS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "type" => {
                if let Value::Array(types) = value {
                    let non_null: Vec<&Value> =
                        types.iter().filter(|t| t.as_str() != Some("null")).collect();
                    match non_null.first() {
                        Some(first) => {
                            cleaned.insert("type".to_string(), (*first).clone());
                        }
                        None => {
                            cleaned.insert("type".to_string(), Value::String("string".into()));
                            cleaned.insert("nullable".to_string(), Value::Bool(true));
                        }
                    }
                } else {
                    cleaned.insert(key.clone(), value.clone());
                }
            }
            k if SCHEMA_MAP_KEYS.contains(&k) => {
                let props = match value {
                    Value::Object(props) => Value::Object(
                        props
                            .iter()
                            .map(|(name, prop)| (name.clone(), clean_json_schema(prop)))
                            .collect(),
                    ),
                    other => other.clone(),
                };
                cleaned.insert(key.clone(), props);
            }
            "items" => {
                let items = match value {
                    Value::Array(list) => {
                        Value::Array(list.iter().map(clean_json_schema).collect())
                    }
                    other => clean_json_schema(other),
                };
                cleaned.insert(key.clone(), items);
            }
            _ => {
                if VALIDATION_KEYS.contains(&key.as_str()) {
                    constraints.push(format!("{}: {}", key, render_constraint(value)));
                }
                // additionalProperties, not, prefixItems, contains, ...
                cleaned.insert(key.clone(), clean_nested(value));
            }
        }
    }

    if !constraints.is_empty() && !cleaned.contains_key("description") {
        cleaned.insert(
            "description".to_string(),
            Value::String(constraints.join(", ")),
        );
    }

    cleaned
}

fn clean_nested(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(clean_object(map)),
        Value::Array(list) => Value::Array(list.iter().map(clean_nested).collect()),
        other => other.clone(),
    }
}

fn render_constraint(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
