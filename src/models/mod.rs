pub mod config;

pub use config::{
    DebugConfig, GatewayConfig, LogFormat, LoggingConfig, ServerConfig, ThinkingConfig,
    TimeoutConfig, UpstreamConfig,
};
