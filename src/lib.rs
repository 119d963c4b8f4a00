pub mod models;
pub mod modules;
pub mod proxy;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::config::GatewayConfig;
use crate::proxy::credentials::CredentialPool;
use crate::proxy::handlers::AppState;
use crate::proxy::middleware::AuthConfig;
use crate::proxy::server::{build_router, GatewayServer};
use crate::proxy::upstream::UpstreamClient;

/// Wire the gateway from a loaded config and serve until Ctrl-C.
pub async fn run(config: GatewayConfig) -> Result<(), String> {
    let pool = Arc::new(CredentialPool::new(config.upstream.credentials_dir.clone()));
    match pool.load().await {
        Ok(count) => info!(
            "Loaded {} credential(s) from {:?}",
            count, config.upstream.credentials_dir
        ),
        Err(e) => warn!("No credentials loaded: {}", e),
    }

    let upstream = UpstreamClient::new(&config.timeouts, config.upstream.base_url.as_deref())?;
    info!("Upstream endpoints: {:?}", upstream.base_urls());

    let state = AppState::new(
        pool,
        Arc::new(RwLock::new(config.upstream.model_mapping.clone())),
        Arc::new(upstream),
        (&config).into(),
        (&config).into(),
    );

    let auth = Arc::new(AuthConfig::new(&config.server.api_password));
    if !auth.enabled() {
        warn!("API_PASSWORD is empty, client authentication is disabled");
    }

    let router = build_router(state, auth);
    let (server, handle) =
        GatewayServer::start(&config.server.host, config.server.port, router).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;
    info!("Shutdown signal received");

    server.stop();
    handle
        .await
        .map_err(|e| format!("Server task failed: {}", e))?;
    Ok(())
}
