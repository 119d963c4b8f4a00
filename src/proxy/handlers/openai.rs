// OpenAI Handler - /v1/chat/completions

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::info;

use super::{call_upstream, error_with_model, new_trace_id, sse_response, AppState};
use crate::proxy::common::model_mapping::map_model;
use crate::proxy::common::redaction::redacted_json;
use crate::proxy::credentials::Credential;
use crate::proxy::error::ProxyError;
use crate::proxy::mappers::claude::build_upstream_payload;
use crate::proxy::mappers::openai::{
    convert_openai_request, convert_openai_response, create_openai_sse_stream, OpenAIRequest,
};

/// Handle OpenAI Chat Completions: POST /v1/chat/completions
pub async fn handle_chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let trace_id = new_trace_id("openai");

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return ProxyError::InvalidRequest(format!("Invalid JSON body: {}", e)).into_response()
        }
    };
    let openai_req: OpenAIRequest = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => {
            return ProxyError::InvalidRequest(format!("Invalid request: {}", e)).into_response()
        }
    };

    info!(
        "[{}] OpenAI Chat Request: {} | {} messages | stream: {}",
        trace_id,
        openai_req.model,
        openai_req.messages.len(),
        openai_req.stream
    );
    if state.debug.enabled {
        info!(
            "[{}] Client request: {}",
            trace_id,
            redacted_json(&raw, state.debug.max_chars)
        );
    }

    let mapped_model = map_model(&openai_req.model, &*state.custom_mapping.read().await);
    let converted = convert_openai_request(&openai_req, &state.thinking);
    if converted.contents.is_empty() {
        return error_with_model(
            ProxyError::InvalidRequest("No valid messages after conversion".to_string()),
            &mapped_model,
        );
    }

    let build = |credential: &Credential| {
        build_upstream_payload(
            &converted,
            credential.project_id_or_placeholder(),
            &mapped_model,
        )
        .0
    };

    let success = match call_upstream(&state, &trace_id, openai_req.stream, build).await {
        Ok(s) => s,
        Err(e) => return error_with_model(e, &mapped_model),
    };
    let credential = success.credential;

    if openai_req.stream {
        let stream = create_openai_sse_stream(
            Box::pin(success.response.bytes_stream()),
            openai_req.model.clone(),
            Some(state.reporter(&credential)),
        );
        return sse_response(stream, &mapped_model, &credential.id);
    }

    let upstream_json: Value = match success.response.json().await {
        Ok(json) => json,
        Err(e) => {
            state.credentials.record_outcome(&credential.id, false);
            return error_with_model(
                ProxyError::Network(format!("Failed to read upstream response: {}", e)),
                &mapped_model,
            );
        }
    };
    state.credentials.record_outcome(&credential.id, true);

    (
        StatusCode::OK,
        [
            ("X-Mapped-Model", mapped_model.as_str()),
            ("X-Credential-Id", credential.id.as_str()),
        ],
        Json(convert_openai_response(&upstream_json, &openai_req.model)),
    )
        .into_response()
}
