use anyhow::{anyhow, Context};

use antigravity_gateway_lib::modules::{init_logger, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()
        .map_err(|e| anyhow!(e))
        .context("Failed to load gateway configuration")?;

    // Held until exit so buffered file logs are flushed.
    let _log_guard = init_logger(&config.logging).map_err(|e| anyhow!(e))?;

    tracing::info!(
        "Starting antigravity gateway v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    antigravity_gateway_lib::run(config)
        .await
        .map_err(|e| anyhow!(e))
        .context("Gateway stopped with an error")
}
