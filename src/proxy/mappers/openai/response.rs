// Antigravity → OpenAI chat completion response transformation

use super::models::*;
use crate::proxy::common::common_utils::remove_nulls;
use crate::proxy::mappers::claude::response::unwrap_response;
use serde_json::{json, Value};

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Map an upstream finish reason. Any tool call forces `tool_calls`.
pub fn map_finish_reason(finish_reason: Option<&str>, used_tool: bool) -> Option<&'static str> {
    let reason = finish_reason?;
    if used_tool {
        return Some("tool_calls");
    }
    Some(match reason {
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        _ => "stop",
    })
}

/// Convert upstream usageMetadata to OpenAI usage.
pub fn extract_usage(usage_metadata: &Value) -> Option<OpenAIUsage> {
    let meta = usage_metadata.as_object()?;
    let count = |key: &str| meta.get(key).and_then(|v| v.as_u64()).map(|v| v as u32);

    let prompt_tokens = count("promptTokenCount").unwrap_or(0);
    let completion_tokens = count("candidatesTokenCount").unwrap_or(0);
    let total_tokens = count("totalTokenCount").unwrap_or(prompt_tokens + completion_tokens);

    Some(OpenAIUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        prompt_tokens_details: count("cachedContentTokenCount").map(|ct| PromptTokensDetails {
            cached_tokens: Some(ct),
        }),
    })
}

/// Tool call from an upstream functionCall object.
pub fn to_tool_call(function_call: &Value) -> ToolCall {
    let name = function_call
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let args = function_call
        .get("args")
        .map(remove_nulls)
        .unwrap_or_else(|| json!({}));
    let id = function_call
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

    ToolCall {
        id,
        r#type: "function".to_string(),
        function: ToolFunction {
            name: name.to_string(),
            arguments: args.to_string(),
        },
    }
}

/// Convert one finished upstream response into a chat completion.
pub fn convert_openai_response(upstream: &Value, model: &str) -> OpenAIResponse {
    let raw = unwrap_response(upstream);
    let mut choices = Vec::new();

    if let Some(candidates) = raw.get("candidates").and_then(|c| c.as_array()) {
        for (idx, candidate) in candidates.iter().enumerate() {
            let mut content_out = String::new();
            let mut thought_out = String::new();
            let mut tool_calls = Vec::new();

            if let Some(parts) = candidate
                .get("content")
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.as_array())
            {
                for part in parts.iter().filter(|p| p.is_object()) {
                    let is_thought_part = part
                        .get("thought")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);

                    if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                        if is_thought_part {
                            thought_out.push_str(text);
                        } else {
                            content_out.push_str(text);
                        }
                    }

                    if let Some(fc) = part.get("functionCall").filter(|f| f.is_object()) {
                        tool_calls.push(to_tool_call(fc));
                    }

                    if let Some(img) = part.get("inlineData") {
                        let mime_type = img
                            .get("mimeType")
                            .and_then(|v| v.as_str())
                            .unwrap_or("image/png");
                        let data = img.get("data").and_then(|v| v.as_str()).unwrap_or("");
                        if !data.is_empty() {
                            content_out.push_str(&format!(
                                "![image](data:{};base64,{})",
                                mime_type, data
                            ));
                        }
                    }
                }
            }

            let finish_reason = map_finish_reason(
                Some(
                    candidate
                        .get("finishReason")
                        .and_then(|f| f.as_str())
                        .unwrap_or("STOP"),
                ),
                !tool_calls.is_empty(),
            );

            choices.push(Choice {
                index: idx as u32,
                message: OpenAIMessage {
                    role: "assistant".to_string(),
                    content: if content_out.is_empty() {
                        None
                    } else {
                        Some(OpenAIContent::String(content_out))
                    },
                    reasoning_content: if thought_out.is_empty() {
                        None
                    } else {
                        Some(thought_out)
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                    name: None,
                },
                finish_reason: finish_reason.map(|f| f.to_string()),
            });
        }
    }

    OpenAIResponse {
        id: new_completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp().max(0) as u64,
        model: model.to_string(),
        choices,
        usage: raw.get("usageMetadata").and_then(extract_usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_reasoning() {
        let upstream = json!({
            "response": {
                "candidates": [{
                    "content": {"parts": [
                        {"text": "pondering", "thought": true},
                        {"text": "Hello"},
                        "junk"
                    ]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
            }
        });
        let resp = convert_openai_response(&upstream, "gpt-4o");
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.model, "gpt-4o");
        assert!(resp.id.starts_with("chatcmpl-"));

        let choice = &resp.choices[0];
        assert_eq!(choice.message.content, Some(OpenAIContent::String("Hello".into())));
        assert_eq!(choice.message.reasoning_content.as_deref(), Some("pondering"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));

        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_tool_calls_force_finish_reason() {
        let upstream = json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "search", "args": {"q": "rust", "page": null}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let resp = convert_openai_response(&upstream, "m");
        let choice = &resp.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        let call = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "search");
        assert_eq!(call.function.arguments, "{\"q\":\"rust\"}");
        assert!(call.id.starts_with("call_"));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("MAX_TOKENS"), false), Some("length"));
        assert_eq!(map_finish_reason(Some("SAFETY"), false), Some("content_filter"));
        assert_eq!(map_finish_reason(Some("OTHER"), false), Some("stop"));
        assert_eq!(map_finish_reason(None, true), None);
    }
}
