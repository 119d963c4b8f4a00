use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret clients must present. Empty disables auth.
    pub api_password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7861,
            api_password: String::new(),
        }
    }
}

// ============================================================================
// Thinking
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThinkingConfig {
    pub default_budget: i64,
    pub max_budget: i64,
    pub enabled: bool,
    pub thinking_to_text_fallback: bool,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            default_budget: default_thinking_budget(),
            max_budget: default_max_thinking_budget(),
            enabled: true,
            thinking_to_text_fallback: true,
        }
    }
}

pub fn default_thinking_budget() -> i64 {
    1024
}

pub fn default_max_thinking_budget() -> i64 {
    32768
}

// ============================================================================
// Timeouts (seconds)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub request: u64,
    pub streaming: u64,
    pub connection: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            streaming: default_streaming_timeout(),
            connection: default_connection_timeout(),
        }
    }
}

pub fn default_request_timeout() -> u64 {
    300
}

pub fn default_streaming_timeout() -> u64 {
    600
}

pub fn default_connection_timeout() -> u64 {
    30
}

// ============================================================================
// Upstream
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Directory holding one credential JSON file per account
    pub credentials_dir: PathBuf,
    /// Replaces the built-in endpoint fallback list when set
    pub base_url: Option<String>,
    /// Custom model mapping, exact ids or `*` wildcards
    pub model_mapping: HashMap<String, String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            credentials_dir: default_credentials_dir(),
            base_url: None,
            model_mapping: HashMap::new(),
        }
    }
}

pub fn default_credentials_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".antigravity_gateway").join("credentials"))
        .unwrap_or_else(|| PathBuf::from("credentials"))
}

// ============================================================================
// Debug payload logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub log_body: bool,
    pub max_chars: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_body: false,
            max_chars: default_debug_max_chars(),
        }
    }
}

pub fn default_debug_max_chars() -> usize {
    2000
}

pub const MIN_DEBUG_MAX_CHARS: usize = 200;

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Daily rolling log files are written here when set
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            dir: None,
        }
    }
}

// ============================================================================
// GatewayConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub thinking: ThinkingConfig,
    pub timeouts: TimeoutConfig,
    pub upstream: UpstreamConfig,
    pub debug: DebugConfig,
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.server.api_password.is_empty()
    }
}
