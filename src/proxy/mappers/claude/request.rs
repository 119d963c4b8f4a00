// Claude → Antigravity request transformation
//
// Produces the upstream `contents`, `systemInstruction`, `tools` and
// `generationConfig` from an Anthropic Messages request, then wraps them in
// the v1internal envelope.

use super::models::*;
use crate::proxy::common::common_utils::{is_non_whitespace_text, stringify};
use crate::proxy::common::json_schema::clean_json_schema;
use crate::proxy::config::ThinkingPreference;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Signature attached to function calls that have no thinking block to
/// inherit one from.
pub const SKIP_SIGNATURE_SENTINEL: &str = "skip_thought_signature_validator";

/// Name used when a tool result cannot be correlated to anything.
const UNKNOWN_FUNCTION_NAME: &str = "unknown_function";

/// Upstream pieces of one converted request.
#[derive(Debug, Clone)]
pub struct ConvertedRequest {
    pub contents: Vec<Value>,
    pub system_instruction: Option<Value>,
    pub tools: Option<Value>,
    pub generation_config: Value,
    /// Thinking survived preference, history and budget checks
    pub thinking_requested: bool,
}

/// Build safety settings for the upstream (all filters disabled for proxy compatibility)
fn build_safety_settings() -> Value {
    json!([
        { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "OFF" },
        { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "OFF" },
        { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "OFF" },
        { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "OFF" },
        { "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": "OFF" },
    ])
}

/// Convert a Claude request into upstream components.
pub fn convert_claude_request(
    claude_req: &ClaudeRequest,
    preference: ThinkingPreference,
) -> Result<ConvertedRequest, String> {
    let (generation_config, thinking_requested) =
        build_generation_config(claude_req, preference);

    let contents = build_contents(&claude_req.messages, thinking_requested)?;
    let contents = reorganize_tool_messages(contents);

    Ok(ConvertedRequest {
        contents,
        system_instruction: claude_req.system.as_ref().and_then(build_system_instruction),
        tools: build_tools(claude_req.tools.as_deref()),
        generation_config,
        thinking_requested,
    })
}

/// Wrap converted components in the v1internal envelope.
///
/// Returns (body, session_id).
pub fn build_upstream_payload(
    converted: &ConvertedRequest,
    project_id: &str,
    mapped_model: &str,
) -> (Value, String) {
    let session_id = format!("session-{}", uuid::Uuid::new_v4());

    let mut inner_request = json!({
        "contents": converted.contents,
        "generationConfig": converted.generation_config,
        "safetySettings": build_safety_settings(),
        "sessionId": session_id,
    });

    if let Some(sys_inst) = &converted.system_instruction {
        inner_request["systemInstruction"] = sys_inst.clone();
    }

    if let Some(tools_val) = &converted.tools {
        inner_request["tools"] = tools_val.clone();
        inner_request["toolConfig"] = json!({
            "functionCallingConfig": { "mode": "VALIDATED" }
        });
    }

    let body = json!({
        "project": project_id,
        "requestId": format!("agent-{}", uuid::Uuid::new_v4()),
        "request": inner_request,
        "model": mapped_model,
        "userAgent": "antigravity",
        "requestType": "chat",
    });

    (body, session_id)
}

/// Build the system instruction. Strings become one part, lists keep their
/// non-blank text entries, anything else is stringified.
pub fn build_system_instruction(system: &Value) -> Option<Value> {
    let mut parts = Vec::new();

    match system {
        Value::Null => {}
        Value::String(text) => {
            if !text.trim().is_empty() {
                parts.push(json!({"text": text}));
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.get("type").and_then(|t| t.as_str()) != Some("text") {
                    continue;
                }
                if let Some(text) = item.get("text") {
                    if is_non_whitespace_text(text) {
                        parts.push(json!({"text": stringify(text)}));
                    }
                }
            }
        }
        other => parts.push(json!({"text": stringify(other)})),
    }

    if parts.is_empty() {
        return None;
    }

    Some(json!({
        "role": "user",
        "parts": parts
    }))
}

/// Build upstream contents from Claude messages.
///
/// The tool correlation table lives for this call only.
pub fn build_contents(messages: &[Message], include_thinking: bool) -> Result<Vec<Value>, String> {
    let mut tool_id_to_name: HashMap<String, String> = HashMap::new();
    let mut contents: Vec<Value> = Vec::new();

    for msg in messages {
        let role = match msg.role.as_str() {
            "assistant" => "model",
            "user" => "user",
            other => return Err(format!("Unsupported message role: {}", other)),
        };

        let parts = build_parts(&msg.content, &mut tool_id_to_name, include_thinking);
        if parts.is_empty() {
            continue;
        }

        contents.push(json!({
            "role": role,
            "parts": parts
        }));
    }

    Ok(contents)
}

fn build_parts(
    content: &MessageContent,
    tool_id_to_name: &mut HashMap<String, String>,
    include_thinking: bool,
) -> Vec<Value> {
    let mut parts = Vec::new();

    match content {
        MessageContent::Text(text) => {
            if !text.trim().is_empty() {
                parts.push(json!({"text": text}));
            }
        }
        MessageContent::Other(value) => {
            if is_non_whitespace_text(value) {
                parts.push(json!({"text": stringify(value)}));
            }
        }
        MessageContent::Blocks(items) => {
            // Signature of the latest thinking block in this message, handed
            // to the next function call only.
            let mut pending_signature: Option<String> = None;

            for item in items {
                let block = match item {
                    ContentItem::Block(block) => block,
                    ContentItem::Raw(raw) => {
                        if let Some(part) = raw_item_part(raw) {
                            parts.push(part);
                        }
                        continue;
                    }
                };

                match block {
                    ContentBlock::Text { text } => {
                        if !text.trim().is_empty() {
                            parts.push(json!({"text": text}));
                        }
                    }
                    ContentBlock::Thinking { thinking, signature } => {
                        if !include_thinking {
                            continue;
                        }
                        let mut part = json!({
                            "text": thinking.clone().unwrap_or_default(),
                            "thought": true,
                        });
                        if let Some(sig) = signature.as_ref().filter(|s| !s.is_empty()) {
                            part["thoughtSignature"] = json!(sig);
                            pending_signature = Some(sig.clone());
                        }
                        parts.push(part);
                    }
                    ContentBlock::RedactedThinking { data, signature } => {
                        if !include_thinking {
                            continue;
                        }
                        // Cannot be replayed upstream without its signature
                        let Some(sig) = signature.as_ref().filter(|s| !s.is_empty()) else {
                            continue;
                        };
                        parts.push(json!({
                            "text": data.clone().unwrap_or_default(),
                            "thought": true,
                            "thoughtSignature": sig,
                        }));
                        pending_signature = Some(sig.clone());
                    }
                    ContentBlock::Image { source } => {
                        parts.push(json!({
                            "inlineData": {
                                "mimeType": source.media_type,
                                "data": source.data
                            }
                        }));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_id_to_name.insert(id.clone(), name.clone());
                        let signature = pending_signature
                            .take()
                            .unwrap_or_else(|| SKIP_SIGNATURE_SENTINEL.to_string());
                        parts.push(json!({
                            "functionCall": {
                                "id": id,
                                "name": name,
                                "args": if input.is_null() { json!({}) } else { input.clone() }
                            },
                            "thoughtSignature": signature
                        }));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        name,
                        content,
                        ..
                    } => {
                        let func_name = resolve_tool_name(tool_use_id, name.as_deref(), tool_id_to_name);
                        parts.push(json!({
                            "functionResponse": {
                                "id": tool_use_id,
                                "name": func_name,
                                "response": {"output": extract_tool_result_output(content.as_ref())}
                            }
                        }));
                    }
                }
            }
        }
    }

    parts
}

/// Content entries that did not parse as a known block. Objects are kept as
/// their JSON text, everything else is stringified.
fn raw_item_part(raw: &Value) -> Option<Value> {
    match raw {
        Value::Object(_) => Some(json!({"text": raw.to_string()})),
        other if is_non_whitespace_text(other) => Some(json!({"text": stringify(other)})),
        _ => None,
    }
}

/// Name for a function response: explicit name, then the correlation table,
/// then `function_<id>`, then `unknown_function`. Never empty.
pub(crate) fn resolve_tool_name(
    tool_use_id: &str,
    explicit: Option<&str>,
    tool_id_to_name: &HashMap<String, String>,
) -> String {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Some(name) = tool_id_to_name.get(tool_use_id).filter(|n| !n.is_empty()) {
        return name.clone();
    }
    if !tool_use_id.is_empty() {
        return format!("function_{}", tool_use_id);
    }
    UNKNOWN_FUNCTION_NAME.to_string()
}

/// Flatten `tool_result.content` into the string the upstream expects.
pub fn extract_tool_result_output(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => match items.first() {
            None => String::new(),
            Some(first) => {
                if first.get("type").and_then(|t| t.as_str()) == Some("text") {
                    first
                        .get("text")
                        .map(stringify)
                        .unwrap_or_default()
                } else {
                    stringify(first)
                }
            }
        },
        Some(other) => stringify(other),
    }
}

/// Drop function responses whose id never appeared on an earlier function
/// call, then drop contents left without parts. Unanswered calls stay.
pub fn reorganize_tool_messages(contents: Vec<Value>) -> Vec<Value> {
    let mut seen_call_ids: HashSet<String> = HashSet::new();
    let mut reorganized = Vec::with_capacity(contents.len());

    for mut content in contents {
        let Some(parts) = content.get_mut("parts").and_then(|p| p.as_array_mut()) else {
            continue;
        };

        let mut kept = Vec::with_capacity(parts.len());
        for part in parts.drain(..) {
            if let Some(call) = part.get("functionCall") {
                if let Some(id) = call.get("id").and_then(|v| v.as_str()) {
                    seen_call_ids.insert(id.to_string());
                }
                kept.push(part);
                continue;
            }
            if let Some(response) = part.get("functionResponse") {
                let matched = response
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map_or(false, |id| seen_call_ids.contains(id));
                if !matched {
                    tracing::debug!("Dropping orphan functionResponse: {}", response);
                    continue;
                }
            }
            kept.push(part);
        }

        if kept.is_empty() {
            continue;
        }
        *parts = kept;
        reorganized.push(content);
    }

    reorganized
}

/// Build upstream tool declarations. Tools with empty names are skipped.
pub fn build_tools(tools: Option<&[Tool]>) -> Option<Value> {
    let tools = tools?;

    let function_declarations: Vec<Value> = tools
        .iter()
        .filter(|tool| !tool.name.is_empty())
        .map(|tool| {
            let mut func_decl = json!({ "name": tool.name });
            if let Some(desc) = &tool.description {
                func_decl["description"] = json!(desc);
            }
            func_decl["parameters"] = match &tool.input_schema {
                Some(schema) if !schema.is_null() => clean_json_schema(schema),
                _ => json!({}),
            };
            func_decl
        })
        .collect();

    if function_declarations.is_empty() {
        return None;
    }

    Some(json!([{ "functionDeclarations": function_declarations }]))
}

/// Type tag of the first block of the last assistant message.
///
/// `None` covers string content, empty lists and non-object first items,
/// all of which are compatible with thinking.
fn last_assistant_first_block_type(messages: &[Message]) -> Option<&str> {
    let last = messages.iter().rev().find(|m| m.is_assistant())?;
    match &last.content {
        MessageContent::Blocks(items) => items.first().and_then(|item| item.block_type()),
        _ => None,
    }
}

/// Build the generation config. Returns (config, thinking_requested).
pub fn build_generation_config(
    claude_req: &ClaudeRequest,
    preference: ThinkingPreference,
) -> (Value, bool) {
    let mut config = json!({});

    if let Some(max_tokens) = claude_req.max_tokens {
        config["maxOutputTokens"] = json!(max_tokens);
    }
    if let Some(temp) = claude_req.temperature {
        config["temperature"] = json!(temp);
    }
    if let Some(top_p) = claude_req.top_p {
        config["topP"] = json!(top_p);
    }
    if let Some(top_k) = claude_req.top_k {
        config["topK"] = json!(top_k);
    }
    if let Some(stops) = claude_req.stop_sequences.as_ref().filter(|s| !s.is_empty()) {
        config["stopSequences"] = json!(stops);
    }

    if !preference.should_include {
        config["thinkingConfig"] = json!({ "includeThoughts": false });
        return (config, false);
    }

    match last_assistant_first_block_type(&claude_req.messages) {
        None | Some("thinking") | Some("redacted_thinking") => {}
        Some(other) => {
            tracing::debug!(
                "Skipping thinking: last assistant message starts with '{}' block",
                other
            );
            return (config, false);
        }
    }

    let mut budget = preference.budget.unwrap_or(0);
    if let Some(max_tokens) = claude_req.max_tokens {
        if budget >= max_tokens {
            budget = max_tokens.saturating_sub(1);
        }
    }
    if budget <= 0 {
        return (config, false);
    }

    config["thinkingConfig"] = json!({
        "includeThoughts": true,
        "thinkingBudget": budget
    });

    (config, true)
}

/// Estimate token count for a Claude request (chars / 4 heuristic).
/// Used for /v1/messages/count_tokens.
pub fn estimate_token_count(request: &Value) -> u32 {
    let mut total_chars: usize = 0;

    if let Some(system) = request.get("system") {
        total_chars += count_chars(system);
    }
    if let Some(messages) = request.get("messages") {
        total_chars += count_chars(messages);
    }
    if let Some(tools) = request.get("tools").and_then(|t| t.as_array()) {
        for tool in tools {
            total_chars += tool.to_string().chars().count();
        }
    }

    (total_chars as f64 / 4.0).ceil() as u32
}

fn count_chars(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.iter().map(count_chars).sum(),
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "role")
            .map(|(_, v)| count_chars(v))
            .sum(),
        Value::Null => 0,
        other => other.to_string().chars().count(),
    }
}

/// A single user "Hi" message is answered locally.
pub fn is_greeting_probe(messages: &[Message]) -> bool {
    let [only] = messages else {
        return false;
    };
    if only.role != "user" {
        return false;
    }
    match &only.content {
        MessageContent::Text(text) => text.trim() == "Hi",
        MessageContent::Blocks(items) => matches!(
            items.as_slice(),
            [ContentItem::Block(ContentBlock::Text { text })] if text.trim() == "Hi"
        ),
        MessageContent::Other(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::config::{resolve_thinking, ThinkingSettings};
    use proptest::prelude::*;
    use serde_json::json;

    fn messages(value: Value) -> Vec<Message> {
        serde_json::from_value(value).unwrap()
    }

    fn request(value: Value) -> ClaudeRequest {
        serde_json::from_value(value).unwrap()
    }

    fn enabled(budget: i64) -> ThinkingPreference {
        ThinkingPreference {
            should_include: true,
            budget: Some(budget),
        }
    }

    fn function_calls(contents: &[Value]) -> Vec<Value> {
        contents
            .iter()
            .flat_map(|c| c["parts"].as_array().cloned().unwrap_or_default())
            .filter(|p| p.get("functionCall").is_some())
            .collect()
    }

    fn function_response_names(contents: &[Value]) -> HashMap<String, String> {
        contents
            .iter()
            .flat_map(|c| c["parts"].as_array().cloned().unwrap_or_default())
            .filter_map(|p| {
                let fr = p.get("functionResponse")?;
                Some((
                    fr["id"].as_str()?.to_string(),
                    fr["name"].as_str()?.to_string(),
                ))
            })
            .collect()
    }

    #[test]
    fn test_basic_request_payload() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "Hello"}]
        }));
        let converted = convert_claude_request(&req, enabled(1024)).unwrap();
        let (body, session_id) = build_upstream_payload(&converted, "proj-1", "claude-sonnet-4-5");

        assert!(session_id.starts_with("session-"));
        assert_eq!(body["project"], "proj-1");
        assert_eq!(body["model"], "claude-sonnet-4-5");
        assert_eq!(body["requestType"], "chat");
        assert_eq!(body["request"]["sessionId"], session_id);
        assert_eq!(body["request"]["contents"][0]["role"], "user");
        assert_eq!(body["request"]["contents"][0]["parts"][0]["text"], "Hello");
        assert!(body["request"].get("systemInstruction").is_none());
    }

    #[test]
    fn test_thinking_block_with_none_text() {
        let msgs = messages(json!([{
            "role": "assistant",
            "content": [{"type": "thinking", "thinking": null, "signature": "sig"}]
        }]));
        let contents = build_contents(&msgs, true).unwrap();
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[0]["parts"][0]["text"], "");
        assert_eq!(contents[0]["parts"][0]["thought"], true);
        assert_eq!(contents[0]["parts"][0]["thoughtSignature"], "sig");
    }

    #[test]
    fn test_redacted_thinking() {
        let msgs = messages(json!([{
            "role": "assistant",
            "content": [{"type": "redacted_thinking", "data": "redacted", "signature": "sig"}]
        }]));
        let contents = build_contents(&msgs, true).unwrap();
        assert_eq!(contents[0]["parts"][0]["text"], "redacted");

        let msgs = messages(json!([{
            "role": "assistant",
            "content": [
                {"type": "redacted_thinking", "data": "redacted"},
                {"type": "text", "text": "visible"}
            ]
        }]));
        let contents = build_contents(&msgs, true).unwrap();
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "visible");
    }

    #[test]
    fn test_thinking_dropped_when_not_requested() {
        let msgs = messages(json!([{
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "plan", "signature": "sig"},
                {"type": "text", "text": "answer"}
            ]
        }]));
        let contents = build_contents(&msgs, false).unwrap();
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "answer");
    }

    #[test]
    fn test_irregular_content_shapes() {
        let msgs = messages(json!([{"role": "user", "content": [{"type": "custom", "data": "value"}]}]));
        let contents = build_contents(&msgs, false).unwrap();
        assert!(contents[0]["parts"][0]["text"].as_str().unwrap().contains("custom"));

        let msgs = messages(json!([{"role": "user", "content": ["plain string", 123]}]));
        let contents = build_contents(&msgs, false).unwrap();
        assert_eq!(contents[0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(contents[0]["parts"][1]["text"], "123");

        let msgs = messages(json!([{"role": "user", "content": 42}]));
        let contents = build_contents(&msgs, false).unwrap();
        assert_eq!(contents[0]["parts"][0]["text"], "42");
    }

    #[test]
    fn test_blank_messages_skipped() {
        let msgs = messages(json!([
            {"role": "user", "content": "  "},
            {"role": "user", "content": [{"type": "text", "text": "\n"}]},
            {"role": "user", "content": "valid"}
        ]));
        let contents = build_contents(&msgs, false).unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["parts"][0]["text"], "valid");
    }

    #[test]
    fn test_unsupported_role_is_error() {
        let msgs = messages(json!([{"role": "system", "content": "x"}]));
        assert!(build_contents(&msgs, false).is_err());
    }

    #[test]
    fn test_image_block_becomes_inline_data() {
        let msgs = messages(json!([{
            "role": "user",
            "content": [{"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}}]
        }]));
        let contents = build_contents(&msgs, false).unwrap();
        assert_eq!(
            contents[0]["parts"][0]["inlineData"],
            json!({"mimeType": "image/png", "data": "AAAA"})
        );
    }

    #[test]
    fn test_tool_result_name_resolution() {
        let msgs = messages(json!([
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "/a"}},
                {"type": "tool_use", "id": "toolu_2", "name": "write_file", "input": {"path": "/b"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"},
                {"type": "tool_result", "tool_use_id": "toolu_2", "content": [{"type": "text", "text": "done"}]}
            ]}
        ]));
        let contents = build_contents(&msgs, false).unwrap();
        let names = function_response_names(&contents);
        assert_eq!(names["toolu_1"], "read_file");
        assert_eq!(names["toolu_2"], "write_file");

        let response = &contents[1]["parts"][1]["functionResponse"];
        assert_eq!(response["response"], json!({"output": "done"}));
    }

    #[test]
    fn test_tool_result_fallback_names() {
        let msgs = messages(json!([{"role": "user", "content": [
            {"type": "tool_result", "tool_use_id": "toolu_explicit", "name": "custom_name", "content": "x"},
            {"type": "tool_result", "tool_use_id": "toolu_orphan", "content": "y"},
            {"type": "tool_result", "tool_use_id": "", "content": "z"}
        ]}]));
        let contents = build_contents(&msgs, false).unwrap();
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["functionResponse"]["name"], "custom_name");
        assert_eq!(parts[1]["functionResponse"]["name"], "function_toolu_orphan");
        assert_eq!(parts[2]["functionResponse"]["name"], "unknown_function");
    }

    #[test]
    fn test_extract_tool_result_output() {
        assert_eq!(extract_tool_result_output(None), "");
        assert_eq!(extract_tool_result_output(Some(&json!([]))), "");
        assert_eq!(
            extract_tool_result_output(Some(&json!([{"type": "text", "text": "result"}]))),
            "result"
        );
        assert!(extract_tool_result_output(Some(&json!([{"type": "other", "data": "value"}])))
            .contains("other"));
        assert_eq!(
            extract_tool_result_output(Some(&json!("direct string"))),
            "direct string"
        );
    }

    #[test]
    fn test_function_call_signatures() {
        let msgs = messages(json!([{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "plan", "signature": "sig_abc"},
            {"type": "tool_use", "id": "toolu_1", "name": "a", "input": {}},
            {"type": "tool_use", "id": "toolu_2", "name": "b", "input": {}},
            {"type": "tool_use", "id": "toolu_3", "name": "c", "input": {}}
        ]}]));
        let contents = build_contents(&msgs, true).unwrap();
        let calls = function_calls(&contents);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0]["thoughtSignature"], "sig_abc");
        assert_eq!(calls[1]["thoughtSignature"], SKIP_SIGNATURE_SENTINEL);
        assert_eq!(calls[2]["thoughtSignature"], SKIP_SIGNATURE_SENTINEL);
    }

    #[test]
    fn test_function_call_signature_from_redacted_thinking() {
        let msgs = messages(json!([{"role": "assistant", "content": [
            {"type": "redacted_thinking", "data": "opaque", "signature": "sig_red"},
            {"type": "tool_use", "id": "toolu_1", "name": "a", "input": {}}
        ]}]));
        let calls = function_calls(&build_contents(&msgs, true).unwrap());
        assert_eq!(calls[0]["thoughtSignature"], "sig_red");
    }

    #[test]
    fn test_function_call_without_thinking_gets_sentinel() {
        let msgs = messages(json!([
            {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "plan", "signature": "sig_prev"},
                {"type": "text", "text": "done"}
            ]},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "a", "input": null}
            ]}
        ]));
        let calls = function_calls(&build_contents(&msgs, true).unwrap());
        assert_eq!(calls[0]["thoughtSignature"], SKIP_SIGNATURE_SENTINEL);
        assert_eq!(calls[0]["functionCall"]["args"], json!({}));
    }

    #[test]
    fn test_reorganize_tool_messages() {
        let contents = vec![json!({
            "role": "model",
            "parts": [{"functionCall": {"id": "t1", "name": "search"}}]
        })];
        assert_eq!(reorganize_tool_messages(contents).len(), 1);

        let contents = vec![
            json!({"role": "user", "parts": [{"functionResponse": {"id": "orphan"}}]}),
            json!({"role": "user", "parts": [{"text": "hello"}]}),
        ];
        let reorganized = reorganize_tool_messages(contents);
        assert_eq!(reorganized.len(), 1);
        assert!(reorganized[0]["parts"][0].get("text").is_some());

        let contents = vec![
            json!({"role": "user", "parts": [{"functionResponse": {"id": "late"}}]}),
            json!({"role": "model", "parts": [{"functionCall": {"id": "late", "name": "x"}}]}),
        ];
        assert_eq!(reorganize_tool_messages(contents).len(), 1);
    }

    #[test]
    fn test_orphan_tool_result_dropped_by_conversion() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "toolu_orphan", "content": "x"}]},
                {"role": "user", "content": "hello"}
            ]
        }));
        let converted = convert_claude_request(&req, enabled(10)).unwrap();
        assert_eq!(converted.contents.len(), 1);
        assert_eq!(converted.contents[0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_system_instruction_shapes() {
        let sys = build_system_instruction(&json!("Be helpful")).unwrap();
        assert_eq!(sys["parts"][0]["text"], "Be helpful");

        let sys = build_system_instruction(&json!([
            {"type": "image", "data": "..."},
            {"type": "text", "text": "  "},
            {"type": "text", "text": "Be helpful"}
        ]))
        .unwrap();
        assert_eq!(sys["parts"].as_array().unwrap().len(), 1);
        assert_eq!(sys["parts"][0]["text"], "Be helpful");

        let sys = build_system_instruction(&json!(42)).unwrap();
        assert_eq!(sys["parts"][0]["text"], "42");

        assert!(build_system_instruction(&json!("   ")).is_none());
    }

    #[test]
    fn test_tools() {
        let tools: Vec<Tool> = serde_json::from_value(json!([
            {"name": "", "description": "Empty name"},
            {"name": "valid", "description": "Valid tool", "input_schema": {
                "$schema": "x", "type": "object", "properties": {"q": {"type": ["string", "null"]}}
            }},
            {"name": "simple"}
        ]))
        .unwrap();
        let result = build_tools(Some(tools.as_slice())).unwrap();
        let decls = result[0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0]["name"], "valid");
        assert!(decls[0]["parameters"].get("$schema").is_none());
        assert_eq!(decls[0]["parameters"]["properties"]["q"]["type"], "string");
        assert_eq!(decls[1]["parameters"], json!({}));

        assert!(build_tools(Some(&[][..])).is_none());
        assert!(build_tools(None).is_none());
    }

    #[test]
    fn test_generation_config_disabled() {
        let req = request(json!({
            "model": "m", "max_tokens": 1000, "messages": [], "thinking": {"type": "disabled"}
        }));
        let pref = resolve_thinking(req.thinking.as_ref(), &ThinkingSettings::default());
        let (config, include) = build_generation_config(&req, pref);
        assert_eq!(config["thinkingConfig"]["includeThoughts"], false);
        assert!(!include);
    }

    #[test]
    fn test_generation_config_incompatible_history() {
        let req = request(json!({
            "model": "m", "max_tokens": 1000, "thinking": {"type": "enabled"},
            "messages": [{"role": "assistant", "content": [{"type": "text", "text": "Hi"}]}]
        }));
        let (config, include) = build_generation_config(&req, enabled(500));
        assert!(!include);
        assert!(config.get("thinkingConfig").is_none());
    }

    #[test]
    fn test_generation_config_compatible_history() {
        for content in [json!(["string content"]), json!([]), json!("plain")] {
            let req = request(json!({
                "model": "m", "max_tokens": 1000,
                "messages": [{"role": "assistant", "content": content}]
            }));
            let (_, include) = build_generation_config(&req, enabled(500));
            assert!(include);
        }

        let req = request(json!({
            "model": "m", "max_tokens": 1000,
            "messages": [{"role": "assistant", "content": [{"type": "thinking", "thinking": "t", "signature": "s"}]}]
        }));
        assert!(build_generation_config(&req, enabled(500)).1);
    }

    #[test]
    fn test_budget_clamped_below_max_tokens() {
        let req = request(json!({
            "model": "m", "max_tokens": 500, "messages": [],
            "thinking": {"type": "enabled", "budget_tokens": 1000}
        }));
        let pref = resolve_thinking(req.thinking.as_ref(), &ThinkingSettings::default());
        let (config, include) = build_generation_config(&req, pref);
        assert!(include);
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], 499);
        assert_eq!(config["thinkingConfig"]["includeThoughts"], true);
        assert_eq!(config["maxOutputTokens"], 500);
    }

    #[test]
    fn test_budget_too_low_omits_thinking() {
        let req = request(json!({
            "model": "m", "max_tokens": 1, "messages": [],
            "thinking": {"type": "enabled", "budget_tokens": 1000}
        }));
        let pref = resolve_thinking(req.thinking.as_ref(), &ThinkingSettings::default());
        let (config, include) = build_generation_config(&req, pref);
        assert!(!include);
        assert!(config.get("thinkingConfig").is_none());
    }

    #[test]
    fn test_extreme_max_tokens_does_not_overflow() {
        let mut req = request(json!({
            "model": "m", "max_tokens": 10, "messages": [],
            "thinking": {"type": "enabled", "budget_tokens": 1000}
        }));
        req.max_tokens = Some(i64::MIN);
        let pref = resolve_thinking(req.thinking.as_ref(), &ThinkingSettings::default());
        let (config, include) = build_generation_config(&req, pref);
        assert!(!include);
        assert!(config.get("thinkingConfig").is_none());
    }

    #[test]
    fn test_estimate_token_count() {
        let body = json!({
            "model": "m",
            "system": "abcd",
            "messages": [{"role": "user", "content": "abcdefgh"}]
        });
        assert_eq!(estimate_token_count(&body), 3);
        assert_eq!(estimate_token_count(&json!({})), 0);
    }

    #[test]
    fn test_greeting_probe() {
        assert!(is_greeting_probe(&messages(json!([{"role": "user", "content": "Hi"}]))));
        assert!(!is_greeting_probe(&messages(json!([{"role": "user", "content": "Hello"}]))));
        assert!(!is_greeting_probe(&messages(json!([
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hi"}
        ]))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_tool_result_name_matches_tool_use(
            id in "toolu_[a-z0-9]{1,12}",
            name in "[a-z_]{1,16}",
        ) {
            let msgs = messages(json!([
                {"role": "assistant", "content": [{"type": "tool_use", "id": id, "name": name, "input": {}}]},
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": id, "content": "ok"}]}
            ]));
            let names = function_response_names(&build_contents(&msgs, false).unwrap());
            prop_assert_eq!(names.get(&id), Some(&name));
        }

        #[test]
        fn prop_orphan_tool_result_name_non_empty(id in "[a-zA-Z0-9_]{0,12}") {
            let msgs = messages(json!([
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": id, "content": "x"}]}
            ]));
            let contents = build_contents(&msgs, false).unwrap();
            let part = &contents[0]["parts"][0]["functionResponse"];
            prop_assert!(!part["name"].as_str().unwrap_or("").is_empty());
        }

        #[test]
        fn prop_every_function_call_has_signature(
            calls in 1usize..6,
            with_thinking in any::<bool>(),
        ) {
            let mut content = Vec::new();
            if with_thinking {
                content.push(json!({"type": "thinking", "thinking": "t", "signature": "sig_x"}));
            }
            for i in 0..calls {
                content.push(json!({"type": "tool_use", "id": format!("toolu_{}", i), "name": "f", "input": {}}));
            }
            let msgs = messages(json!([{"role": "assistant", "content": content}]));
            let fcs = function_calls(&build_contents(&msgs, true).unwrap());
            prop_assert_eq!(fcs.len(), calls);

            let mut with_sig = 0;
            for fc in &fcs {
                let sig = fc["thoughtSignature"].as_str().unwrap_or("");
                prop_assert!(!sig.is_empty());
                if sig == "sig_x" {
                    with_sig += 1;
                }
            }
            prop_assert_eq!(with_sig, if with_thinking { 1 } else { 0 });
        }
    }
}
