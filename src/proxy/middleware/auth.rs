// API key authentication middleware
use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::proxy::error::ProxyError;

/// Shared secret, stored as a digest
#[derive(Clone, Debug)]
pub struct AuthConfig {
    digest: Option<[u8; 32]>,
}

impl AuthConfig {
    /// An empty password disables auth.
    pub fn new(api_password: &str) -> Self {
        let digest = if api_password.is_empty() {
            None
        } else {
            Some(Self::hash(api_password))
        };
        Self { digest }
    }

    fn hash(value: &str) -> [u8; 32] {
        Sha256::digest(value.as_bytes()).into()
    }

    pub fn enabled(&self) -> bool {
        self.digest.is_some()
    }

    pub fn accepts(&self, key: Option<&str>) -> bool {
        match (&self.digest, key) {
            (None, _) => true,
            (Some(expected), Some(key)) => Self::hash(key) == *expected,
            (Some(_), None) => false,
        }
    }
}

/// Extract the API key: `Authorization: Bearer <k>` first, then `x-api-key`.
fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}

fn is_health_check(path: &str) -> bool {
    path == "/health" || path == "/healthz"
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if is_health_check(&path) {
        tracing::trace!("Health: {} {}", method, path);
        return Ok(next.run(request).await);
    }
    tracing::info!("Request: {} {}", method, path);

    // Allow CORS preflight
    if method == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request);
    if auth.accepts(api_key.as_deref()) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rejected request with invalid API key: {} {}", method, path);
        Err(ProxyError::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(password: &str) -> Router {
        let auth = Arc::new(AuthConfig::new(password));
        Router::new()
            .route("/v1/models", get(|| async { "ok" }).options(|| async { "preflight" }))
            .route("/health", get(|| async { "healthy" }))
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
    }

    async fn status(app: Router, request: axum::http::Request<Body>) -> StatusCode {
        app.oneshot(request).await.unwrap().status()
    }

    fn get_req(path: &str) -> axum::http::request::Builder {
        axum::http::Request::builder().uri(path)
    }

    #[test]
    fn test_auth_config() {
        let off = AuthConfig::new("");
        assert!(!off.enabled());
        assert!(off.accepts(None));

        let on = AuthConfig::new("secret");
        assert!(on.accepts(Some("secret")));
        assert!(!on.accepts(Some("wrong")));
        assert!(!on.accepts(None));
    }

    #[tokio::test]
    async fn test_bearer_and_x_api_key() {
        let req = get_req("/v1/models")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::OK);

        let req = get_req("/v1/models")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_forbidden() {
        let req = get_req("/v1/models").body(Body::empty()).unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::FORBIDDEN);

        let req = get_req("/v1/models")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_health_and_options_bypass() {
        let req = get_req("/health").body(Body::empty()).unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::OK);

        let req = get_req("/v1/models")
            .method(Method::OPTIONS)
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app("secret"), req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_auth_allows_all() {
        let req = get_req("/v1/models").body(Body::empty()).unwrap();
        assert_eq!(status(app(""), req).await, StatusCode::OK);
    }
}
