use std::path::Path;

use crate::models::config::{
    default_connection_timeout, default_debug_max_chars, default_max_thinking_budget,
    default_request_timeout, default_streaming_timeout, default_thinking_budget, GatewayConfig,
    LogFormat, MIN_DEBUG_MAX_CHARS,
};
use crate::proxy::common::model_mapping::parse_mapping_list;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Load configuration: defaults → optional TOML file → process environment.
pub fn load_config() -> Result<GatewayConfig, String> {
    let path = std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.is_empty());
    load_config_with(path.as_deref().map(Path::new), &|key: &str| std::env::var(key).ok())
}

/// Load configuration with an explicit file and variable lookup.
pub fn load_config_with(
    path: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, String> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config, env);
    validate_config(&config)?;
    Ok(config)
}

/// Parse a TOML config file. Missing sections and fields keep their defaults.
pub fn load_config_file(path: &Path) -> Result<GatewayConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed_to_read_config_file {:?}: {}", path, e))?;
    toml::from_str(&content).map_err(|e| format!("failed_to_parse_config_file {:?}: {}", path, e))
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Non-negative integer, or `default` when unparsable or negative.
fn parse_budget(value: &str, default: i64) -> i64 {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= 0)
        .unwrap_or(default)
}

/// Strictly positive seconds, or `default`.
fn parse_timeout(value: &str, default: u64) -> u64 {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

fn parse_max_chars(value: &str) -> usize {
    match value.trim().parse::<i64>() {
        Ok(v) => (v.max(MIN_DEBUG_MAX_CHARS as i64)) as usize,
        Err(_) => default_debug_max_chars(),
    }
}

pub fn apply_env_overrides(config: &mut GatewayConfig, env: &dyn Fn(&str) -> Option<String>) {
    let set_bool = |key: &str, target: &mut bool| {
        if let Some(v) = env(key).as_deref().and_then(parse_bool) {
            *target = v;
        }
    };

    // Server
    if let Some(host) = env("HOST").filter(|h| !h.trim().is_empty()) {
        config.server.host = host.trim().to_string();
    }
    if let Some(port) = env("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
        config.server.port = port;
    }
    if let Some(password) = env("API_PASSWORD") {
        config.server.api_password = password;
    }

    // Thinking
    if let Some(v) = env("ANTHROPIC_DEFAULT_THINKING_BUDGET") {
        config.thinking.default_budget = parse_budget(&v, default_thinking_budget());
    }
    if let Some(v) = env("ANTHROPIC_MAX_THINKING_BUDGET") {
        config.thinking.max_budget = parse_budget(&v, default_max_thinking_budget());
    }
    set_bool("ANTHROPIC_THINKING_ENABLED", &mut config.thinking.enabled);
    set_bool(
        "ANTHROPIC_THINKING_TO_TEXT_FALLBACK",
        &mut config.thinking.thinking_to_text_fallback,
    );

    // Timeouts
    if let Some(v) = env("REQUEST_TIMEOUT") {
        config.timeouts.request = parse_timeout(&v, default_request_timeout());
    }
    if let Some(v) = env("STREAMING_TIMEOUT") {
        config.timeouts.streaming = parse_timeout(&v, default_streaming_timeout());
    }
    if let Some(v) = env("CONNECTION_TIMEOUT") {
        config.timeouts.connection = parse_timeout(&v, default_connection_timeout());
    }

    // Upstream
    if let Some(dir) = env("ANTIGRAVITY_CREDENTIALS_DIR").filter(|d| !d.trim().is_empty()) {
        config.upstream.credentials_dir = dir.trim().into();
    }
    if let Some(url) = env("ANTIGRAVITY_BASE_URL") {
        let url = url.trim();
        config.upstream.base_url = if url.is_empty() {
            None
        } else {
            Some(url.to_string())
        };
    }
    if let Some(raw) = env("ANTIGRAVITY_MODEL_MAPPING") {
        config.upstream.model_mapping.extend(parse_mapping_list(&raw));
    }

    // Debug
    set_bool("ANTHROPIC_DEBUG", &mut config.debug.enabled);
    set_bool("ANTHROPIC_DEBUG_BODY", &mut config.debug.log_body);
    if let Some(v) = env("ANTHROPIC_DEBUG_MAX_CHARS") {
        config.debug.max_chars = parse_max_chars(&v);
    }

    // Logging
    if let Some(level) = env("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
        config.logging.level = level.trim().to_lowercase();
    }
    match env("LOG_FORMAT").map(|f| f.trim().to_lowercase()).as_deref() {
        Some("json") => config.logging.format = LogFormat::Json,
        Some("text") => config.logging.format = LogFormat::Text,
        _ => {}
    }
    if let Some(dir) = env("LOG_DIR") {
        let dir = dir.trim();
        config.logging.dir = if dir.is_empty() { None } else { Some(dir.into()) };
    }
}

fn validate_config(config: &GatewayConfig) -> Result<(), String> {
    if let Some(base_url) = &config.upstream.base_url {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| format!("invalid upstream base_url {:?}: {}", base_url, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(format!(
                "invalid upstream base_url {:?}: scheme must be http or https",
                base_url
            ));
        }
    }
    if config.debug.max_chars < MIN_DEBUG_MAX_CHARS {
        return Err(format!(
            "debug.max_chars must be at least {}",
            MIN_DEBUG_MAX_CHARS
        ));
    }
    Ok(())
}
