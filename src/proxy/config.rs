// Engine-facing settings
//
// The mappers never read the environment. The handler layer derives these
// plain values from `GatewayConfig` and passes them down per request.

use serde_json::Value;

use crate::models::config::GatewayConfig;

// ============================================================================
// Thinking settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingSettings {
    /// Budget used when the client asks for thinking without naming one
    pub default_budget: i64,
    /// Upper bound applied to any requested budget
    pub max_budget: i64,
    /// Whether thinking is on when the client says nothing
    pub enabled: bool,
    /// Render thoughts as wrapped text when the client did not ask for them
    pub thinking_to_text: bool,
}

impl Default for ThinkingSettings {
    fn default() -> Self {
        Self {
            default_budget: 1024,
            max_budget: 32768,
            enabled: true,
            thinking_to_text: true,
        }
    }
}

impl From<&GatewayConfig> for ThinkingSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            default_budget: config.thinking.default_budget,
            max_budget: config.thinking.max_budget,
            enabled: config.thinking.enabled,
            thinking_to_text: config.thinking.thinking_to_text_fallback,
        }
    }
}

/// What the client asked for, before history and token limits are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingPreference {
    pub should_include: bool,
    pub budget: Option<i64>,
}

impl ThinkingPreference {
    pub fn enabled(budget: i64, settings: &ThinkingSettings) -> Self {
        Self {
            should_include: true,
            budget: Some(budget.min(settings.max_budget)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            should_include: false,
            budget: None,
        }
    }
}

/// Interpret the `thinking` field of a Messages request.
///
/// `false`, `{"type": "disabled"}` and unrecognized `type` values disable
/// thinking. `true`, typeless objects and other shapes enable it with the
/// default budget. A missing field falls back to `settings.enabled`.
pub fn resolve_thinking(thinking: Option<&Value>, settings: &ThinkingSettings) -> ThinkingPreference {
    match thinking {
        None | Some(Value::Null) => {
            if settings.enabled {
                ThinkingPreference::enabled(settings.default_budget, settings)
            } else {
                ThinkingPreference::disabled()
            }
        }
        Some(Value::Bool(false)) => ThinkingPreference::disabled(),
        Some(Value::Bool(true)) => ThinkingPreference::enabled(settings.default_budget, settings),
        Some(Value::Object(map)) => match map.get("type").and_then(|t| t.as_str()) {
            Some("enabled") => {
                let budget = map
                    .get("budget_tokens")
                    .and_then(|b| b.as_i64())
                    .unwrap_or(settings.default_budget);
                ThinkingPreference::enabled(budget, settings)
            }
            Some(_) => ThinkingPreference::disabled(),
            None if map.contains_key("type") => ThinkingPreference::disabled(),
            None => ThinkingPreference::enabled(settings.default_budget, settings),
        },
        Some(_) => ThinkingPreference::enabled(settings.default_budget, settings),
    }
}

// ============================================================================
// Debug logging settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSettings {
    pub enabled: bool,
    pub log_body: bool,
    pub max_chars: usize,
}

impl From<&GatewayConfig> for DebugSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            enabled: config.debug.enabled,
            log_body: config.debug.log_body,
            max_chars: config.debug.max_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ThinkingSettings {
        ThinkingSettings::default()
    }

    #[test]
    fn test_absent_follows_feature_flag() {
        let pref = resolve_thinking(None, &settings());
        assert!(pref.should_include);
        assert_eq!(pref.budget, Some(1024));

        let off = ThinkingSettings {
            enabled: false,
            ..settings()
        };
        assert!(!resolve_thinking(None, &off).should_include);
        assert!(!resolve_thinking(Some(&json!(null)), &off).should_include);
    }

    #[test]
    fn test_boolean_forms() {
        assert!(!resolve_thinking(Some(&json!(false)), &settings()).should_include);
        assert_eq!(
            resolve_thinking(Some(&json!(true)), &settings()).budget,
            Some(1024)
        );
    }

    #[test]
    fn test_object_forms() {
        let pref = resolve_thinking(
            Some(&json!({"type": "enabled", "budget_tokens": 4000})),
            &settings(),
        );
        assert_eq!(pref.budget, Some(4000));

        let pref = resolve_thinking(Some(&json!({"type": "enabled"})), &settings());
        assert_eq!(pref.budget, Some(1024));

        assert!(!resolve_thinking(Some(&json!({"type": "disabled"})), &settings()).should_include);
        assert!(!resolve_thinking(Some(&json!({"type": "unknown"})), &settings()).should_include);
        assert!(!resolve_thinking(Some(&json!({"type": 7})), &settings()).should_include);

        let pref = resolve_thinking(Some(&json!({})), &settings());
        assert!(pref.should_include);
        assert_eq!(pref.budget, Some(1024));
    }

    #[test]
    fn test_other_values_enable_with_default() {
        let pref = resolve_thinking(Some(&json!("string value")), &settings());
        assert!(pref.should_include);
        assert_eq!(pref.budget, Some(1024));
    }

    #[test]
    fn test_budget_capped_at_max() {
        let pref = resolve_thinking(
            Some(&json!({"type": "enabled", "budget_tokens": 100000})),
            &settings(),
        );
        assert_eq!(pref.budget, Some(32768));
    }
}
