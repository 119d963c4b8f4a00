// Handlers module - API endpoint processors
//
// - POST /v1/messages, /v1/messages/count_tokens (Anthropic)
// - POST /v1/chat/completions (OpenAI)
// - GET  /v1/models

pub mod claude;
pub mod openai;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::proxy::config::{DebugSettings, ThinkingSettings};
use crate::proxy::credentials::{Credential, CredentialGateway, OutcomeReporter};
use crate::proxy::error::ProxyError;
use crate::proxy::upstream::client::UpstreamClient;

/// Shared application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialGateway>,
    pub custom_mapping: Arc<RwLock<HashMap<String, String>>>,
    pub upstream: Arc<UpstreamClient>,
    pub thinking: ThinkingSettings,
    pub debug: DebugSettings,
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialGateway>,
        custom_mapping: Arc<RwLock<HashMap<String, String>>>,
        upstream: Arc<UpstreamClient>,
        thinking: ThinkingSettings,
        debug: DebugSettings,
    ) -> Self {
        Self {
            credentials,
            custom_mapping,
            upstream,
            thinking,
            debug,
        }
    }

    pub fn reporter(&self, credential: &Credential) -> OutcomeReporter {
        OutcomeReporter::new(self.credentials.clone(), credential.id.clone())
    }
}

pub(crate) fn new_trace_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..8])
}

/// Result of a successful upstream call.
pub(crate) struct UpstreamSuccess {
    pub credential: Credential,
    pub response: reqwest::Response,
}

/// Acquire a credential and send the payload built for it.
///
/// Non-success statuses and transport failures are recorded against the
/// credential and returned as `ProxyError`.
pub(crate) async fn call_upstream<F>(
    state: &AppState,
    trace_id: &str,
    stream: bool,
    build_payload: F,
) -> Result<UpstreamSuccess, ProxyError>
where
    F: FnOnce(&Credential) -> serde_json::Value,
{
    let credential = state
        .credentials
        .acquire()
        .await
        .ok_or(ProxyError::NoCredentials)?;

    if let Some(email) = credential.email.as_deref() {
        tracing::info!(
            "[{}] ✓ Using credential: {} ({})",
            trace_id,
            credential.id,
            crate::proxy::upstream::client::mask_email(email)
        );
    } else {
        tracing::info!("[{}] ✓ Using credential: {}", trace_id, credential.id);
    }

    let payload = build_payload(&credential);
    if state.debug.enabled && state.debug.log_body {
        tracing::info!(
            "[{}] Upstream request body: {}",
            trace_id,
            crate::proxy::common::redaction::redacted_json(&payload, state.debug.max_chars)
        );
    }

    let response = match state
        .upstream
        .generate(&credential.access_token, &payload, stream)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("[{}] Upstream {} failure: {}", trace_id, e.category, e.message);
            state.credentials.record_outcome(&credential.id, false);
            return Err(ProxyError::Network(e.message));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status_code));
        let message = crate::proxy::common::error_classifier::extract_upstream_message(&error_text);

        if status_code == 429 {
            tracing::warn!("[{}] Upstream rate limited (429): {}", trace_id, message);
        } else {
            tracing::error!("[{}] Upstream error {}: {}", trace_id, status_code, message);
        }
        state.credentials.record_outcome(&credential.id, false);
        return Err(ProxyError::Upstream {
            status: status_code,
            message,
        });
    }

    Ok(UpstreamSuccess {
        credential,
        response,
    })
}

/// Attach `X-Mapped-Model` to an error response.
pub(crate) fn error_with_model(error: ProxyError, mapped_model: &str) -> Response {
    let mut response = error.into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(mapped_model) {
        response.headers_mut().insert("X-Mapped-Model", value);
    }
    response
}

/// Build a `text/event-stream` response.
pub(crate) fn sse_response(
    stream: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>,
    mapped_model: &str,
    credential_id: &str,
) -> Response {
    let body = axum::body::Body::from_stream(stream);
    Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .header("X-Mapped-Model", mapped_model)
        .header("X-Credential-Id", credential_id)
        .body(body)
        .unwrap_or_else(|e| {
            ProxyError::Internal(format!("Failed to build stream response: {}", e)).into_response()
        })
}
