// OpenAI streaming conversion
//
// Antigravity SSE chunks → `chat.completion.chunk` lines, terminated by
// `data: [DONE]`.

use super::models::OpenAIUsage;
use super::response::{extract_usage, map_finish_reason, new_completion_id, to_tool_call};
use crate::proxy::common::common_utils::describe_error;
use crate::proxy::credentials::OutcomeReporter;
use crate::proxy::mappers::claude::response::unwrap_response;
use crate::proxy::mappers::claude::streaming::{parse_sse_line, SseLine};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Per-stream chunk builder
struct ChunkWriter {
    id: String,
    created: i64,
    model: String,
    tool_call_index: usize,
    used_tool: bool,
    usage: Option<OpenAIUsage>,
    finished: bool,
}

impl ChunkWriter {
    fn new(model: String) -> Self {
        Self {
            id: new_completion_id(),
            created: Utc::now().timestamp(),
            model,
            tool_call_index: 0,
            used_tool: false,
            usage: None,
            finished: false,
        }
    }

    fn frame(data: &Value) -> Bytes {
        Bytes::from(format!(
            "data: {}\n\n",
            serde_json::to_string(data).unwrap_or_default()
        ))
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason
            }]
        })
    }

    /// Convert one upstream chunk into zero or more output frames.
    fn process(&mut self, value: &Value) -> Vec<Bytes> {
        let mut out = Vec::new();
        let raw = unwrap_response(value);

        if let Some(usage) = raw.get("usageMetadata").and_then(extract_usage) {
            self.usage = Some(usage);
        }

        let Some(candidate) = raw
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            return out;
        };

        let mut content_out = String::new();
        let mut thought_out = String::new();

        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts.iter().filter(|p| p.is_object()) {
                let is_thought = part
                    .get("thought")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);

                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    if is_thought {
                        thought_out.push_str(text);
                    } else {
                        content_out.push_str(text);
                    }
                }

                if let Some(fc) = part.get("functionCall").filter(|f| f.is_object()) {
                    let call = to_tool_call(fc);
                    let delta = json!({
                        "role": "assistant",
                        "tool_calls": [{
                            "index": self.tool_call_index,
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.function.name, "arguments": call.function.arguments }
                        }]
                    });
                    self.tool_call_index += 1;
                    self.used_tool = true;
                    out.push(Self::frame(&self.chunk(delta, None)));
                }
            }
        }

        if !thought_out.is_empty() {
            let delta = json!({ "role": "assistant", "content": null, "reasoning_content": thought_out });
            out.push(Self::frame(&self.chunk(delta, None)));
        }

        let finish_reason = map_finish_reason(
            candidate.get("finishReason").and_then(|f| f.as_str()),
            self.used_tool,
        );

        if !content_out.is_empty() || finish_reason.is_some() {
            let mut chunk = self.chunk(json!({ "content": content_out }), finish_reason);
            if finish_reason.is_some() {
                if let Some(usage) = self.usage.take() {
                    chunk["usage"] = serde_json::to_value(usage).unwrap_or(Value::Null);
                }
                self.finished = true;
            }
            out.push(Self::frame(&chunk));
        }

        out
    }

    fn error_frame(&self, message: &str) -> Bytes {
        Self::frame(&json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [],
            "error": {
                "type": "api_error",
                "message": message
            }
        }))
    }
}

/// Create an OpenAI-compatible SSE stream from an upstream SSE byte stream.
pub fn create_openai_sse_stream<S, E>(
    mut upstream: S,
    model: String,
    reporter: Option<OutcomeReporter>,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut writer = ChunkWriter::new(model);
        let mut buffer = BytesMut::new();
        let mut reporter = reporter;

        'read: loop {
            match tokio::time::timeout(HEARTBEAT_INTERVAL, upstream.next()).await {
                Ok(Some(Ok(bytes))) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_raw = buffer.split_to(pos + 1);
                        let Ok(line) = std::str::from_utf8(&line_raw) else {
                            continue;
                        };
                        match parse_sse_line(line) {
                            SseLine::Skip => {}
                            SseLine::Done => break 'read,
                            SseLine::Data(value) => {
                                if let Some(r) = reporter.take() {
                                    r.report(true);
                                }
                                for frame in writer.process(&value) {
                                    yield Ok::<Bytes, String>(frame);
                                }
                                if writer.finished {
                                    break 'read;
                                }
                            }
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    let message = describe_error(&e);
                    tracing::error!("OpenAI Stream Error: {}", message);
                    yield Ok(writer.error_frame(&message));
                    break 'read;
                }
                Ok(None) => break,
                Err(_) => {
                    // SSE heartbeat to keep the connection alive
                    yield Ok(Bytes::from(": ping\n\n"));
                }
            }
        }

        yield Ok(Bytes::from("data: [DONE]\n\n"));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(value: Value) -> Result<Bytes, std::io::Error> {
        Ok(Bytes::from(format!("data: {}\n", value)))
    }

    async fn collect(chunks: Vec<Result<Bytes, std::io::Error>>) -> Vec<String> {
        let output: Vec<Bytes> = create_openai_sse_stream(futures::stream::iter(chunks), "gpt-4o".into(), None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        output
            .iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    fn payload(frame: &str) -> Value {
        serde_json::from_str(frame.trim().trim_start_matches("data: ")).unwrap()
    }

    #[tokio::test]
    async fn test_text_stream_ends_with_done() {
        let frames = collect(vec![
            line(json!({"response": {"candidates": [{"content": {"parts": [{"text": "Hel"}]}}]}})),
            line(json!({"response": {
                "candidates": [{"content": {"parts": [{"text": "lo"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
            }})),
        ])
        .await;

        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
        let first = payload(&frames[0]);
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");

        let last = payload(&frames[1]);
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        assert_eq!(last["usage"]["total_tokens"], 5);
    }

    #[tokio::test]
    async fn test_tool_call_and_reasoning_chunks() {
        let frames = collect(vec![line(json!({"candidates": [{
            "content": {"parts": [
                {"text": "thinking", "thought": true},
                {"functionCall": {"id": "c1", "name": "lookup", "args": {"q": "x"}}}
            ]},
            "finishReason": "STOP"
        }]}))])
        .await;

        let tool = payload(&frames[0]);
        assert_eq!(tool["choices"][0]["delta"]["tool_calls"][0]["id"], "c1");
        assert_eq!(tool["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"], "{\"q\":\"x\"}");

        let reasoning = payload(&frames[1]);
        assert_eq!(reasoning["choices"][0]["delta"]["reasoning_content"], "thinking");

        let finish = payload(&frames[2]);
        assert_eq!(finish["choices"][0]["finish_reason"], "tool_calls");
    }

    #[tokio::test]
    async fn test_error_chunk_before_done() {
        let frames = collect(vec![
            line(json!({"candidates": [{"content": {"parts": [{"text": "a"}]}}]})),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "connection reset")),
        ])
        .await;
        assert_eq!(frames.len(), 3);
        let error = payload(&frames[1]);
        assert_eq!(error["error"]["message"], "connection reset");
        assert_eq!(frames[2], "data: [DONE]\n\n");
    }
}
