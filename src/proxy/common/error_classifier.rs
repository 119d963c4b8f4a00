// Error classification
// Maps upstream statuses and transport failures onto Anthropic error types

/// Anthropic error `type` for an HTTP status.
pub fn error_type_for_status(status: u16) -> &'static str {
    match status {
        400 | 422 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        413 => "request_too_large",
        429 => "rate_limit_error",
        529 => "overloaded_error",
        _ => "api_error",
    }
}

/// Client-facing status for an upstream failure.
///
/// 4xx statuses pass through; everything else becomes 500.
pub fn client_status_for_upstream(status: u16) -> u16 {
    if (400..500).contains(&status) {
        status
    } else {
        500
    }
}

/// Short category for a transport error, used in logs.
pub fn classify_network_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "timeout_error"
    } else if error.is_connect() {
        "connection_error"
    } else if error.is_decode() {
        "decode_error"
    } else if error.is_body() {
        "stream_error"
    } else {
        "network_error"
    }
}

/// Pull a readable message out of an upstream error body.
///
/// Google style `{"error": {"message": ...}}` bodies yield the inner
/// message; anything else is returned trimmed.
pub fn extract_upstream_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
    }
    body.trim().to_string()
}
