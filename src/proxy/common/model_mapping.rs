// Model name mapping and normalization
//
// Client model ids are resolved in this order:
// - exact match in the custom mapping
// - wildcard match in the custom mapping (most specific pattern wins)
// - built-in table after version normalization
// - the default model

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Model used when nothing else matches.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Upstream model ids that pass through unchanged.
static SUPPORTED_MODELS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "gemini-2.5-flash",
        "gemini-2.5-flash-thinking",
        "gemini-2.5-pro",
        "gemini-3-pro-low",
        "gemini-3-pro-high",
        "gemini-3-pro-image",
        "gemini-3-flash",
        "gemini-2.5-flash-lite",
        "gemini-2.5-flash-image",
        "claude-sonnet-4-5",
        "claude-sonnet-4-5-thinking",
        "claude-opus-4-5-thinking",
        "gpt-oss-120b-medium",
    ]
});

static SUPPORTED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| SUPPORTED_MODELS.iter().copied().collect());

/// Client families that redirect to a different upstream model.
static BUILTIN_REDIRECTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("claude-opus-4-5", "claude-opus-4-5-thinking");
    m.insert("claude-haiku-4-5", "gemini-2.5-flash");
    m.insert("claude-3-5-sonnet", "claude-sonnet-4-5");
    m.insert("claude-opus-4", "gemini-3-pro-high");
    m.insert("claude-3-haiku", "gemini-2.5-flash");
    m
});

static DATE_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"-\d{8}$").ok());
static DOTTED_VERSION: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d)\.(\d)").ok());

/// Canonical family name: trailing `-YYYYMMDD` dropped, `4.5` written as `4-5`.
pub fn normalize_model_name(model: &str) -> String {
    let mut name = model.trim().to_string();
    if let Some(re) = DATE_SUFFIX.as_ref() {
        name = re.replace(&name, "").into_owned();
    }
    if let Some(re) = DOTTED_VERSION.as_ref() {
        name = re.replace_all(&name, "$1-$2").into_owned();
    }
    name
}

fn map_builtin(model: &str) -> String {
    if SUPPORTED_SET.contains(model) {
        return model.to_string();
    }

    let normalized = normalize_model_name(model);
    if SUPPORTED_SET.contains(normalized.as_str()) {
        return normalized;
    }
    if let Some(target) = BUILTIN_REDIRECTS.get(normalized.as_str()) {
        return target.to_string();
    }

    DEFAULT_MODEL.to_string()
}

/// Wildcard matching - supports multiple `*` wildcards.
///
/// Case-sensitive. Examples:
/// - `claude-*` matches `claude-3-5-sonnet-20241022`
/// - `*-thinking` matches `claude-opus-4-5-thinking`
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut text_pos = 0;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            if !text[text_pos..].starts_with(part) {
                return false;
            }
            text_pos += part.len();
        } else if i == parts.len() - 1 {
            return text[text_pos..].ends_with(part);
        } else if let Some(pos) = text[text_pos..].find(part) {
            text_pos += pos + part.len();
        } else {
            return false;
        }
    }

    true
}

/// Best wildcard match from the custom mapping. The pattern with the most
/// literal characters wins.
pub fn get_wildcard_mapping(
    model: &str,
    custom_mapping: &HashMap<String, String>,
) -> Option<String> {
    let mut best_match: Option<(&str, usize)> = None;

    for (pattern, target) in custom_mapping.iter() {
        if pattern.contains('*') && wildcard_match(pattern, model) {
            let specificity = pattern.chars().count() - pattern.matches('*').count();
            if best_match.map_or(true, |(_, best)| specificity > best) {
                best_match = Some((target.as_str(), specificity));
            }
        }
    }

    best_match.map(|(target, _)| target.to_string())
}

/// Map a client model id to an upstream model id. Never fails.
pub fn map_model(model: &str, custom_mapping: &HashMap<String, String>) -> String {
    if let Some(target) = custom_mapping.get(model) {
        return target.clone();
    }

    if let Some(target) = get_wildcard_mapping(model, custom_mapping) {
        return target;
    }

    map_builtin(model)
}

/// Model ids advertised on `/v1/models`.
pub fn get_supported_models() -> Vec<String> {
    SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect()
}

/// Parse `from=to,from2=to2` into a mapping table. Malformed entries are ignored.
pub fn parse_mapping_list(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|entry| {
            let (from, to) = entry.split_once('=')?;
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return None;
            }
            Some((from.to_string(), to.to_string()))
        })
        .collect()
}
