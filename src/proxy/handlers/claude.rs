// Claude Handler - /v1/messages, /v1/messages/count_tokens, /v1/models

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{call_upstream, error_with_model, new_trace_id, sse_response, AppState};
use crate::proxy::common::model_mapping::{get_supported_models, map_model};
use crate::proxy::common::redaction::redacted_json;
use crate::proxy::config::{resolve_thinking, ThinkingPreference};
use crate::proxy::credentials::Credential;
use crate::proxy::error::ProxyError;
use crate::proxy::mappers::claude::{
    build_upstream_payload, convert_claude_request, convert_response, create_claude_sse_stream,
    estimate_token_count, greeting_response, is_greeting_probe, new_message_id, ClaudeRequest,
    StreamOptions,
};

/// Model suffix that forces thinking off for one request
const NO_THINKING_SUFFIX: &str = "-nothinking";

/// Validate and type a Messages request body.
///
/// Checks run in a fixed order so clients get the most basic problem first.
fn parse_messages_body(body: &[u8], require_max_tokens: bool) -> Result<(Value, ClaudeRequest), ProxyError> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let Some(obj) = raw.as_object() else {
        return Err(ProxyError::InvalidRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let mut required = vec!["model"];
    if require_max_tokens {
        required.push("max_tokens");
    }
    required.push("messages");

    for field in required {
        if obj.get(field).map_or(true, |v| v.is_null()) {
            return Err(ProxyError::InvalidRequest(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    let request: ClaudeRequest = serde_json::from_value(raw.clone())
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid request body: {}", e)))?;

    if require_max_tokens && request.max_tokens.map_or(false, |m| m < 1) {
        return Err(ProxyError::InvalidRequest(
            "max_tokens must be a positive integer".to_string(),
        ));
    }

    Ok((raw, request))
}

/// Estimated prompt tokens; never fails.
fn safe_token_estimate(raw: &Value) -> u32 {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| estimate_token_count(raw)))
        .unwrap_or(0)
}

/// Handle Claude Messages: POST /v1/messages
pub async fn handle_messages(State(state): State<AppState>, body: Bytes) -> Response {
    let trace_id = new_trace_id("claude");

    let (raw, request) = match parse_messages_body(&body, true) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("[{}] Rejected request: {}", trace_id, e);
            return e.into_response();
        }
    };

    info!(
        "[{}] Claude Request | Model: {} | Stream: {} | Messages: {}",
        trace_id,
        request.model,
        request.stream,
        request.messages.len(),
    );

    if state.debug.enabled {
        info!(
            "[{}] Client request: {}",
            trace_id,
            redacted_json(&raw, state.debug.max_chars)
        );
    }

    if is_greeting_probe(&request.messages) {
        info!("[{}] Answering greeting probe locally", trace_id);
        return Json(greeting_response(&request.model)).into_response();
    }

    // Model route resolution
    let (base_model, force_no_thinking) = match request.model.strip_suffix(NO_THINKING_SUFFIX) {
        Some(base) => (base.to_string(), true),
        None => (request.model.clone(), false),
    };
    let mapped_model = map_model(&base_model, &*state.custom_mapping.read().await);

    let preference = if force_no_thinking {
        ThinkingPreference::disabled()
    } else {
        resolve_thinking(request.thinking.as_ref(), &state.thinking)
    };

    // Transform request
    let converted = match convert_claude_request(&request, preference) {
        Ok(c) => c,
        Err(e) => return error_with_model(ProxyError::Conversion(e), &mapped_model),
    };
    if converted.contents.is_empty() {
        return error_with_model(
            ProxyError::InvalidRequest("No valid messages after conversion".to_string()),
            &mapped_model,
        );
    }

    let thinking_enabled = converted.thinking_requested && !force_no_thinking;
    let thinking_to_text = force_no_thinking || state.thinking.thinking_to_text;
    let input_tokens = safe_token_estimate(&raw);

    info!(
        "[{}] Mapped {} -> {} | thinking: {}",
        trace_id, request.model, mapped_model, thinking_enabled
    );

    let build = |credential: &Credential| {
        build_upstream_payload(
            &converted,
            credential.project_id_or_placeholder(),
            &mapped_model,
        )
        .0
    };

    let success = match call_upstream(&state, &trace_id, request.stream, build).await {
        Ok(s) => s,
        Err(e) => return error_with_model(e, &mapped_model),
    };
    let credential = success.credential;
    let message_id = new_message_id();

    if request.stream {
        let options = StreamOptions {
            model: request.model.clone(),
            message_id,
            thinking_enabled,
            thinking_to_text,
            initial_input_tokens: input_tokens as i64,
        };
        let claude_stream = create_claude_sse_stream(
            Box::pin(success.response.bytes_stream()),
            options,
            Some(state.reporter(&credential)),
        );
        return sse_response(claude_stream, &mapped_model, &credential.id);
    }

    // Non-streaming response
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

    let claude_response = convert_response(
        &upstream_json,
        &request.model,
        &message_id,
        thinking_enabled,
        thinking_to_text,
        input_tokens,
    );
    state.credentials.record_outcome(&credential.id, true);

    (
        StatusCode::OK,
        [
            ("X-Mapped-Model", mapped_model.as_str()),
            ("X-Credential-Id", credential.id.as_str()),
        ],
        Json(claude_response),
    )
        .into_response()
}

/// Handle Claude Token Count: POST /v1/messages/count_tokens
pub async fn handle_count_tokens(body: Bytes) -> Result<impl IntoResponse, ProxyError> {
    let (raw, _request) = parse_messages_body(&body, false)?;
    Ok(Json(json!({ "input_tokens": safe_token_estimate(&raw) })))
}

/// Handle Model List: GET /v1/models (Anthropic format)
pub async fn handle_list_models() -> impl IntoResponse {
    let data: Vec<_> = get_supported_models()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "type": "model",
                "display_name": id.clone(),
                "created_at": "2024-01-31T00:00:00Z"
            })
        })
        .collect();

    Json(json!({
        "data": data,
        "has_more": false,
        "first_id": data.first().and_then(|d| d.get("id")).and_then(|v| v.as_str()).unwrap_or(""),
        "last_id": data.last().and_then(|d| d.get("id")).and_then(|v| v.as_str()).unwrap_or("")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(result: Result<(Value, ClaudeRequest), ProxyError>) -> Option<String> {
        result.err().map(|e| e.to_string())
    }

    #[test]
    fn test_validation_order() {
        assert!(status_of(parse_messages_body(b"{not json", true))
            .unwrap()
            .starts_with("Invalid JSON body"));
        assert_eq!(
            status_of(parse_messages_body(b"[1, 2]", true)).unwrap(),
            "Request body must be a JSON object"
        );
        assert_eq!(
            status_of(parse_messages_body(br#"{"max_tokens": 10}"#, true)).unwrap(),
            "Missing required field: model"
        );
        assert_eq!(
            status_of(parse_messages_body(br#"{"model": "m", "messages": []}"#, true)).unwrap(),
            "Missing required field: max_tokens"
        );
        assert_eq!(
            status_of(parse_messages_body(br#"{"model": "m", "max_tokens": 10}"#, true)).unwrap(),
            "Missing required field: messages"
        );
        assert!(status_of(parse_messages_body(
            br#"{"model": "m", "max_tokens": 10, "messages": "nope"}"#,
            true
        ))
        .unwrap()
        .starts_with("Invalid request body"));
    }

    #[test]
    fn test_non_positive_max_tokens_rejected() {
        for max_tokens in ["0", "-5", "-9223372036854775808"] {
            let body = format!(
                r#"{{"model": "m", "max_tokens": {}, "messages": [{{"role": "user", "content": "x"}}]}}"#,
                max_tokens
            );
            assert_eq!(
                status_of(parse_messages_body(body.as_bytes(), true)).unwrap(),
                "max_tokens must be a positive integer"
            );
        }
        let body = br#"{"model": "m", "max_tokens": 1, "messages": [{"role": "user", "content": "x"}]}"#;
        assert!(parse_messages_body(body, true).is_ok());
    }

    #[test]
    fn test_count_tokens_does_not_need_max_tokens() {
        let body = br#"{"model": "m", "messages": [{"role": "user", "content": "Hello, world!"}]}"#;
        let (raw, request) = parse_messages_body(body, false).unwrap();
        assert_eq!(request.messages.len(), 1);
        assert!(safe_token_estimate(&raw) > 0);
    }
}
