// OpenAI → Antigravity request transformation

use super::models::*;
use crate::proxy::config::{ThinkingPreference, ThinkingSettings};
use crate::proxy::mappers::claude::models::Tool;
use crate::proxy::mappers::claude::request::{
    build_tools, reorganize_tool_messages, resolve_tool_name, SKIP_SIGNATURE_SENTINEL,
};
use crate::proxy::mappers::claude::ConvertedRequest;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Convert an OpenAI chat request into upstream components.
///
/// The result is wrapped with the same `build_upstream_payload` as the
/// Anthropic path.
pub fn convert_openai_request(request: &OpenAIRequest, settings: &ThinkingSettings) -> ConvertedRequest {
    // 1. System instructions
    let system_texts: Vec<String> = request
        .messages
        .iter()
        .filter(|msg| msg.role == "system" || msg.role == "developer")
        .filter_map(|msg| msg.content.as_ref().map(|c| c.joined_text()))
        .filter(|text| !text.trim().is_empty())
        .collect();

    let system_instruction = if system_texts.is_empty() {
        None
    } else {
        let parts: Vec<Value> = system_texts.iter().map(|s| json!({"text": s})).collect();
        Some(json!({ "role": "user", "parts": parts }))
    };

    // Pre-scan to map tool_call_id to function name
    let mut tool_id_to_name: HashMap<String, String> = HashMap::new();
    for msg in &request.messages {
        if let Some(tool_calls) = &msg.tool_calls {
            for call in tool_calls {
                tool_id_to_name.insert(call.id.clone(), call.function.name.clone());
            }
        }
    }

    // 2. Contents (system/developer messages excluded)
    let contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|msg| msg.role != "system" && msg.role != "developer")
        .map(|msg| {
            let role = if msg.role == "assistant" { "model" } else { "user" };
            let is_tool_role = msg.role == "tool" || msg.role == "function";
            let mut parts = Vec::new();

            if let (Some(content), false) = (&msg.content, is_tool_role) {
                push_content_parts(content, &mut parts);
            }

            if let Some(tool_calls) = &msg.tool_calls {
                for tc in tool_calls {
                    let args = serde_json::from_str::<Value>(&tc.function.arguments)
                        .ok()
                        .filter(|v| v.is_object())
                        .unwrap_or_else(|| json!({}));
                    parts.push(json!({
                        "functionCall": {
                            "id": tc.id,
                            "name": tc.function.name,
                            "args": args,
                        },
                        "thoughtSignature": SKIP_SIGNATURE_SENTINEL
                    }));
                }
            }

            if is_tool_role {
                let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
                let name = resolve_tool_name(call_id, msg.name.as_deref(), &tool_id_to_name);
                let output = msg.content.as_ref().map(|c| c.joined_text()).unwrap_or_default();

                parts.push(json!({
                    "functionResponse": {
                        "id": call_id,
                        "name": name,
                        "response": { "output": output }
                    }
                }));
            }

            json!({ "role": role, "parts": parts })
        })
        .filter(|msg| !msg["parts"].as_array().map(|a| a.is_empty()).unwrap_or(true))
        .collect();

    // Merge consecutive same-role messages (upstream requires user/model alternation)
    let mut merged_contents: Vec<Value> = Vec::new();
    for msg in contents {
        if let Some(last) = merged_contents.last_mut() {
            if last["role"] == msg["role"] {
                if let (Some(last_parts), Some(msg_parts)) =
                    (last["parts"].as_array_mut(), msg["parts"].as_array())
                {
                    last_parts.extend(msg_parts.iter().cloned());
                    continue;
                }
            }
        }
        merged_contents.push(msg);
    }
    let merged_contents = reorganize_tool_messages(merged_contents);

    // 3. Generation config
    let (generation_config, thinking_requested) = build_generation_config(request, settings);

    // 4. Tools
    let tools: Option<Vec<Tool>> = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter_map(|tool| {
                let func = tool.get("function").unwrap_or(tool);
                let name = func.get("name").and_then(|v| v.as_str())?;
                Some(Tool {
                    name: name.to_string(),
                    description: func
                        .get("description")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    input_schema: Some(
                        func.get("parameters")
                            .cloned()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    ),
                })
            })
            .collect()
    });

    ConvertedRequest {
        contents: merged_contents,
        system_instruction,
        tools: build_tools(tools.as_deref()),
        generation_config,
        thinking_requested,
    }
}

fn push_content_parts(content: &OpenAIContent, parts: &mut Vec<Value>) {
    match content {
        OpenAIContent::String(s) => {
            if !s.is_empty() {
                parts.push(json!({"text": s}));
            }
        }
        OpenAIContent::Array(blocks) => {
            for block in blocks {
                match block {
                    OpenAIContentBlock::Text { text } => {
                        parts.push(json!({"text": text}));
                    }
                    OpenAIContentBlock::ImageUrl { image_url } => {
                        if let Some(inline) = parse_data_url(&image_url.url) {
                            parts.push(inline);
                        } else if image_url.url.starts_with("http") {
                            parts.push(json!({
                                "fileData": { "fileUri": &image_url.url, "mimeType": "image/jpeg" }
                            }));
                        }
                    }
                    OpenAIContentBlock::Unsupported => {}
                }
            }
        }
    }
}

/// `data:<mime>;base64,<data>` → inlineData part
fn parse_data_url(url: &str) -> Option<Value> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.split(';').next().filter(|m| !m.is_empty()).unwrap_or("image/jpeg");
    Some(json!({
        "inlineData": { "mimeType": mime_type, "data": data }
    }))
}

fn build_generation_config(request: &OpenAIRequest, settings: &ThinkingSettings) -> (Value, bool) {
    let mut config = json!({});

    if let Some(max_tokens) = request.max_tokens {
        config["maxOutputTokens"] = json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        config["temperature"] = json!(temp);
    }
    if let Some(top_p) = request.top_p {
        config["topP"] = json!(top_p);
    }
    match &request.stop {
        Some(Value::String(s)) => config["stopSequences"] = json!([s]),
        Some(Value::Array(items)) if !items.is_empty() => config["stopSequences"] = json!(items),
        _ => {}
    }

    let preference = if settings.enabled {
        ThinkingPreference::enabled(settings.default_budget, settings)
    } else {
        ThinkingPreference::disabled()
    };

    let mut budget = preference.budget.unwrap_or(0);
    if let Some(max_tokens) = request.max_tokens {
        if budget >= max_tokens as i64 {
            budget = max_tokens as i64 - 1;
        }
    }

    if !preference.should_include || budget <= 0 {
        config["thinkingConfig"] = json!({ "includeThoughts": false });
        return (config, false);
    }

    config["thinkingConfig"] = json!({
        "includeThoughts": true,
        "thinkingBudget": budget
    });
    (config, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Value) -> OpenAIRequest {
        serde_json::from_value(json!({
            "model": "gemini-2.5-flash",
            "messages": messages
        }))
        .unwrap()
    }

    fn function_call_parts(converted: &ConvertedRequest) -> Vec<Value> {
        converted
            .contents
            .iter()
            .filter(|c| c["role"] == "model")
            .flat_map(|c| c["parts"].as_array().cloned().unwrap_or_default())
            .filter(|p| p.get("functionCall").is_some())
            .collect()
    }

    #[test]
    fn test_function_calls_carry_sentinel() {
        let req = request(json!([
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "func1", "arguments": "{\"a\": 1}"}},
                {"id": "call_2", "type": "function", "function": {"name": "func2", "arguments": "not json"}}
            ]}
        ]));
        let converted = convert_openai_request(&req, &ThinkingSettings::default());
        let calls = function_call_parts(&converted);
        assert_eq!(calls.len(), 2);
        for call in &calls {
            assert_eq!(call["thoughtSignature"], SKIP_SIGNATURE_SENTINEL);
        }
        assert_eq!(calls[0]["functionCall"]["args"], json!({"a": 1}));
        assert_eq!(calls[1]["functionCall"]["args"], json!({}));
    }

    #[test]
    fn test_tool_messages_resolve_names() {
        let req = request(json!([
            {"role": "user", "content": "Weather?"},
            {"role": "assistant", "tool_calls": [
                {"id": "call_w", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_w", "content": "sunny"},
            {"role": "tool", "tool_call_id": "call_missing", "content": "?"}
        ]));
        let converted = convert_openai_request(&req, &ThinkingSettings::default());
        assert_eq!(converted.contents.len(), 3);
        let responses = converted.contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["functionResponse"]["name"], "get_weather");
        assert_eq!(responses[0]["functionResponse"]["response"]["output"], "sunny");
    }

    #[test]
    fn test_unnamed_call_falls_back_to_id_name() {
        let req = request(json!([
            {"role": "user", "content": "Go"},
            {"role": "assistant", "tool_calls": [
                {"id": "call_9", "type": "function", "function": {"name": "", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_9", "content": "done"}
        ]));
        let converted = convert_openai_request(&req, &ThinkingSettings::default());
        let response = &converted.contents[2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "function_call_9");
        assert_eq!(response["id"], "call_9");
    }

    #[test]
    fn test_orphan_tool_message_dropped() {
        let req = request(json!([
            {"role": "user", "content": "Hi there"},
            {"role": "tool", "tool_call_id": "call_none", "content": "stray"}
        ]));
        let converted = convert_openai_request(&req, &ThinkingSettings::default());
        assert_eq!(converted.contents.len(), 1);
        let parts = converted.contents[0]["parts"].as_array().unwrap();
        assert!(parts.iter().all(|p| p.get("functionResponse").is_none()));
    }

    #[test]
    fn test_system_and_images() {
        let req = request(json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": [
                {"type": "text", "text": "What is this?"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                {"type": "audio_url", "audio_url": {"url": "x"}}
            ]}
        ]));
        let converted = convert_openai_request(&req, &ThinkingSettings::default());
        assert_eq!(
            converted.system_instruction.unwrap()["parts"][0]["text"],
            "Be brief."
        );
        let parts = converted.contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AAAA");
    }

    #[test]
    fn test_tools_and_generation_config() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 512,
            "temperature": 0.5,
            "stop": "END",
            "tools": [{"type": "function", "function": {
                "name": "lookup",
                "parameters": {"type": "object", "properties": {"q": {"type": "string", "minLength": 1}}, "additionalProperties": false}
            }}]
        }))
        .unwrap();
        let converted = convert_openai_request(&req, &ThinkingSettings::default());

        let decl = &converted.tools.unwrap()[0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "lookup");
        assert!(decl["parameters"].get("additionalProperties").is_none());

        let config = &converted.generation_config;
        assert_eq!(config["maxOutputTokens"], 512);
        assert_eq!(config["stopSequences"], json!(["END"]));
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], 511);
        assert!(converted.thinking_requested);
    }

    #[test]
    fn test_thinking_disabled_by_settings() {
        let req = request(json!([{"role": "user", "content": "hi"}]));
        let settings = ThinkingSettings {
            enabled: false,
            ..ThinkingSettings::default()
        };
        let converted = convert_openai_request(&req, &settings);
        assert_eq!(
            converted.generation_config["thinkingConfig"],
            json!({"includeThoughts": false})
        );
        assert!(!converted.thinking_requested);
    }
}
