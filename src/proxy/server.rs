// Proxy Server - route assembly, middleware stack, and server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::proxy::handlers::{self, AppState};
use crate::proxy::middleware::{auth_middleware, cors_layer, AuthConfig};

const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

// ============================================================================
// Health check handler
// ============================================================================

async fn health_check_handler() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
    .into_response()
}

// ============================================================================
// Route builder
// ============================================================================

/// Build the gateway router.
///
/// Layers run outermost first: body limit → CORS → trace → auth → handler.
pub fn build_router(state: AppState, auth: Arc<AuthConfig>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(health_check_handler))
        .route("/healthz", get(health_check_handler))
        // Anthropic Messages
        .route("/v1/messages", post(handlers::claude::handle_messages))
        .route("/antigravity/v1/messages", post(handlers::claude::handle_messages))
        .route(
            "/v1/messages/count_tokens",
            post(handlers::claude::handle_count_tokens),
        )
        .route(
            "/antigravity/v1/messages/count_tokens",
            post(handlers::claude::handle_count_tokens),
        )
        .route("/v1/models", get(handlers::claude::handle_list_models))
        // OpenAI chat
        .route(
            "/v1/chat/completions",
            post(handlers::openai::handle_chat_completions),
        )
        .layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

// ============================================================================
// GatewayServer - server lifecycle
// ============================================================================

#[derive(Clone)]
pub struct GatewayServer {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl GatewayServer {
    /// Bind and start serving in a background task.
    pub async fn start(
        host: &str,
        port: u16,
        app: Router,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))?;

        info!("Gateway listening on http://{}", local_addr);

        let shutdown = CancellationToken::new();
        let server = Self {
            shutdown: shutdown.clone(),
            local_addr,
        };

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            let app_service = app.into_service();

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, remote_addr)) => {
                                let io = TokioIo::new(stream);

                                use tower::ServiceExt;
                                use hyper::body::Incoming;
                                let svc = app_service.clone().map_request(
                                    move |mut req: axum::http::Request<Incoming>| {
                                        req.extensions_mut().insert(
                                            axum::extract::ConnectInfo(remote_addr),
                                        );
                                        req
                                    },
                                );
                                let hyper_svc = TowerToHyperService::new(svc);
                                let conn_shutdown = shutdown.clone();

                                tokio::task::spawn(async move {
                                    let conn = http1::Builder::new()
                                        .serve_connection(io, hyper_svc);
                                    tokio::select! {
                                        res = conn => {
                                            if let Err(err) = res {
                                                debug!("Connection ended: {:?}", err);
                                            }
                                        }
                                        _ = conn_shutdown.cancelled() => {
                                            debug!("Connection from {} closed on shutdown", remote_addr);
                                        }
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept connection failed: {:?}", e);
                            }
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Gateway shutting down");
                        break;
                    }
                }
            }
        });

        Ok((server, handle))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and drop in-flight ones.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}
