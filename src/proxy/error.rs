// Gateway error type and its Anthropic-shaped HTTP rendering

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::proxy::common::error_classifier::{client_status_for_upstream, error_type_for_status};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Request conversion failed: {0}")]
    Conversion(String),

    #[error("Invalid API key")]
    Authentication,

    #[error("No available credentials")]
    NoCredentials,

    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            ProxyError::InvalidRequest(_) | ProxyError::Conversion(_) => 400,
            ProxyError::Authentication => 403,
            ProxyError::Upstream { status, .. } => client_status_for_upstream(*status),
            ProxyError::NoCredentials | ProxyError::Network(_) | ProxyError::Internal(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) | ProxyError::Conversion(_) => "invalid_request_error",
            ProxyError::Authentication => "authentication_error",
            ProxyError::Upstream { status, .. } => error_type_for_status(*status),
            ProxyError::NoCredentials | ProxyError::Network(_) | ProxyError::Internal(_) => {
                "api_error"
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string()
            }
        });
        (status, Json(body)).into_response()
    }
}
