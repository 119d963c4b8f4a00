// Middleware module - request interception

pub mod auth;

pub use auth::{auth_middleware, AuthConfig};

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for browser-based clients
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
