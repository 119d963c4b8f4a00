// Antigravity → Claude response transformation (non-streaming)

use super::models::*;
use crate::proxy::common::common_utils::remove_nulls;
use serde_json::{json, Map, Value};

pub const THINKING_TEXT_OPEN: &str = "<assistant_thinking>\n";
pub const THINKING_TEXT_CLOSE: &str = "\n</assistant_thinking>\n\n";

/// Fresh Anthropic message id.
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Fresh tool_use id for calls the upstream sent without one.
pub fn new_tool_use_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

/// Wrap buffered thoughts for clients that only render text.
pub fn wrap_thinking_text(thinking: &str) -> String {
    format!("{}{}{}", THINKING_TEXT_OPEN, thinking, THINKING_TEXT_CLOSE)
}

/// Map an upstream finish reason. Any tool call wins.
pub fn map_stop_reason(finish_reason: Option<&str>, used_tool: bool) -> &'static str {
    if used_tool {
        return "tool_use";
    }
    match finish_reason {
        Some("MAX_TOKENS") => "max_tokens",
        _ => "end_turn",
    }
}

/// The upstream sometimes nests the payload under `response`.
pub fn unwrap_response(upstream: &Value) -> &Value {
    match upstream.get("response") {
        Some(inner) if inner.is_object() => inner,
        _ => upstream,
    }
}

fn usage_keys(meta: &Map<String, Value>) -> std::collections::HashSet<&str> {
    meta.keys().map(|k| k.as_str()).collect()
}

/// Pick the usage metadata to report: the candidate-level one when it has
/// every response-level key and more, otherwise the response-level one.
pub fn select_usage_metadata<'a>(
    response: &'a Value,
    candidate: Option<&'a Value>,
) -> Option<&'a Map<String, Value>> {
    let response_meta = response.get("usageMetadata").and_then(|u| u.as_object());
    let candidate_meta = candidate
        .and_then(|c| c.get("usageMetadata"))
        .and_then(|u| u.as_object());

    match (response_meta, candidate_meta) {
        (Some(resp), Some(cand)) => {
            let resp_keys = usage_keys(resp);
            let cand_keys = usage_keys(cand);
            if cand_keys.len() > resp_keys.len() && resp_keys.is_subset(&cand_keys) {
                Some(cand)
            } else {
                Some(resp)
            }
        }
        (None, Some(cand)) => Some(cand),
        (resp, None) => resp,
    }
}

fn token_count(meta: &Map<String, Value>, key: &str) -> Option<u32> {
    meta.get(key)
        .and_then(|v| v.as_i64())
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
}

/// Convert usage metadata to Claude usage.
pub fn to_claude_usage(meta: Option<&Map<String, Value>>, fallback_input_tokens: u32) -> Usage {
    match meta {
        Some(meta) => Usage {
            input_tokens: token_count(meta, "promptTokenCount").unwrap_or(fallback_input_tokens),
            output_tokens: token_count(meta, "candidatesTokenCount").unwrap_or(0),
        },
        None => Usage {
            input_tokens: fallback_input_tokens,
            output_tokens: 0,
        },
    }
}

/// Non-streaming response processor
pub struct NonStreamingProcessor {
    content_blocks: Vec<ContentBlock>,
    text_builder: String,
    thinking_builder: String,
    thinking_signature: Option<String>,
    /// Thoughts waiting to be rendered as wrapped text
    thinking_text_buffer: String,
    thinking_enabled: bool,
    thinking_to_text: bool,
    pub has_tool_call: bool,
}

impl NonStreamingProcessor {
    pub fn new(thinking_enabled: bool, thinking_to_text: bool) -> Self {
        Self {
            content_blocks: Vec::new(),
            text_builder: String::new(),
            thinking_builder: String::new(),
            thinking_signature: None,
            thinking_text_buffer: String::new(),
            thinking_enabled,
            thinking_to_text,
            has_tool_call: false,
        }
    }

    /// Process the parts of one candidate and return the content blocks.
    pub fn process(mut self, parts: &[UpstreamPart]) -> (Vec<ContentBlock>, bool) {
        for part in parts {
            self.process_part(part);
        }

        self.flush_thinking_text();
        self.flush_thinking();
        self.flush_text();

        (self.content_blocks, self.has_tool_call)
    }

    fn process_part(&mut self, part: &UpstreamPart) {
        // 1. FunctionCall handling
        if let Some(fc) = &part.function_call {
            self.flush_thinking_text();
            self.flush_thinking();
            self.flush_text();
            self.has_tool_call = true;

            let tool_id = fc
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_tool_use_id);
            let args = fc
                .args
                .as_ref()
                .map(remove_nulls)
                .unwrap_or_else(|| json!({}));

            self.content_blocks.push(ContentBlock::ToolUse {
                id: tool_id,
                name: fc.name.clone(),
                input: args,
            });
            return;
        }

        // 2. Text handling
        if let Some(text) = &part.text {
            if part.is_thought() {
                self.process_thought(text, part.thought_signature.as_deref());
            } else if !text.is_empty() {
                // Whitespace-only text never opens a block, matching the
                // streaming path.
                if text.trim().is_empty()
                    && self.text_builder.is_empty()
                    && self.thinking_text_buffer.is_empty()
                {
                    return;
                }
                self.flush_thinking();
                self.flush_thinking_text();
                self.text_builder.push_str(text);
            }
            return;
        }

        // 3. InlineData (image) handling
        if let Some(img) = &part.inline_data {
            self.flush_thinking_text();
            self.flush_thinking();
            self.flush_text();
            if !img.data.is_empty() {
                self.content_blocks.push(ContentBlock::Image {
                    source: ImageSource {
                        source_type: "base64".to_string(),
                        media_type: img.mime_type.clone(),
                        data: img.data.clone(),
                    },
                });
            }
        }
    }

    fn process_thought(&mut self, text: &str, signature: Option<&str>) {
        if self.thinking_enabled {
            self.flush_text();
            self.thinking_builder.push_str(text);
            if let Some(sig) = signature.filter(|s| !s.is_empty()) {
                self.thinking_signature = Some(sig.to_string());
            }
        } else if self.thinking_to_text {
            self.thinking_text_buffer.push_str(text);
        }
    }

    /// Move buffered thoughts into the text builder, ahead of whatever comes next.
    fn flush_thinking_text(&mut self) {
        if self.thinking_text_buffer.is_empty() {
            return;
        }
        let thinking = std::mem::take(&mut self.thinking_text_buffer);
        self.text_builder.push_str(&wrap_thinking_text(&thinking));
    }

    fn flush_text(&mut self) {
        if self.text_builder.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_builder);
        self.content_blocks.push(ContentBlock::Text { text });
    }

    fn flush_thinking(&mut self) {
        if self.thinking_builder.is_empty() && self.thinking_signature.is_none() {
            return;
        }
        let thinking = std::mem::take(&mut self.thinking_builder);
        let signature = self.thinking_signature.take();
        self.content_blocks.push(ContentBlock::Thinking {
            thinking: Some(thinking),
            signature,
        });
    }
}

/// Convert one finished upstream response into a Claude message.
pub fn convert_response(
    upstream: &Value,
    model: &str,
    message_id: &str,
    thinking_enabled: bool,
    thinking_to_text: bool,
    fallback_input_tokens: u32,
) -> ClaudeResponse {
    let response = unwrap_response(upstream);
    let candidate = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let parts = candidate.map(parse_parts).unwrap_or_default();
    let (content, has_tool_call) =
        NonStreamingProcessor::new(thinking_enabled, thinking_to_text).process(&parts);

    let finish_reason = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(|f| f.as_str());

    let usage = to_claude_usage(
        select_usage_metadata(response, candidate),
        fallback_input_tokens,
    );

    ClaudeResponse {
        id: message_id.to_string(),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason: map_stop_reason(finish_reason, has_tool_call).to_string(),
        stop_sequence: None,
        usage,
    }
}

/// Local reply for the single "Hi" probe.
pub fn greeting_response(model: &str) -> ClaudeResponse {
    ClaudeResponse {
        id: new_message_id(),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content: vec![ContentBlock::text(
            "Hi! This is the antigravity gateway. Send a real prompt to reach the upstream model.",
        )],
        stop_reason: "end_turn".to_string(),
        stop_sequence: None,
        usage: Usage {
            input_tokens: 0,
            output_tokens: 0,
        },
    }
}
