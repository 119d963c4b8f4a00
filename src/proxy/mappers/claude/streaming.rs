// Claude streaming response transformation (Antigravity SSE → Claude SSE)
//
// Block events produced before `message_start` can be built are held back
// and released right after it, so `message_start` is always the first event.

use super::models::*;
use super::response::{
    map_stop_reason, new_tool_use_id, select_usage_metadata, to_claude_usage, unwrap_response,
    wrap_thinking_text,
};
use crate::proxy::common::common_utils::{describe_error, remove_nulls};
use crate::proxy::credentials::OutcomeReporter;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;

/// Idle time after which a keep-alive comment is sent.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Block type in the streaming state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    None,
    Text,
    Thinking,
    Function,
    Image,
}

/// Per-stream parameters supplied by the handler.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub model: String,
    pub message_id: String,
    pub thinking_enabled: bool,
    pub thinking_to_text: bool,
    /// Estimated prompt tokens, used until the upstream reports usage
    pub initial_input_tokens: i64,
}

/// Streaming state machine for Claude SSE conversion
pub struct StreamingState {
    options: StreamOptions,
    fallback_input_tokens: u32,
    block_type: BlockType,
    pub block_index: usize,
    message_start_sent: bool,
    message_stop_sent: bool,
    used_tool: bool,
    /// The open thinking block already carries a signature
    signature_sent: bool,
    thinking_text_buffer: String,
    usage: Option<Usage>,
    pending: Vec<Bytes>,
}

impl StreamingState {
    pub fn new(options: StreamOptions) -> Self {
        let fallback_input_tokens = options.initial_input_tokens.clamp(0, u32::MAX as i64) as u32;
        Self {
            options,
            fallback_input_tokens,
            block_type: BlockType::None,
            block_index: 0,
            message_start_sent: false,
            message_stop_sent: false,
            used_tool: false,
            signature_sent: false,
            thinking_text_buffer: String::new(),
            usage: None,
            pending: Vec::new(),
        }
    }

    /// Format an SSE event
    pub fn emit(event_type: &str, data: &Value) -> Bytes {
        let sse = format!(
            "event: {}\ndata: {}\n\n",
            event_type,
            serde_json::to_string(data).unwrap_or_default()
        );
        Bytes::from(sse)
    }

    fn push(&mut self, event_type: &str, data: Value) {
        let bytes = Self::emit(event_type, &data);
        self.pending.push(bytes);
    }

    /// Events ready to be sent. Nothing is released before `message_start`.
    pub fn drain(&mut self) -> Vec<Bytes> {
        if !self.message_start_sent {
            return Vec::new();
        }
        std::mem::take(&mut self.pending)
    }

    pub fn message_start_sent(&self) -> bool {
        self.message_start_sent
    }

    pub fn is_finished(&self) -> bool {
        self.message_stop_sent
    }

    fn current_usage(&self) -> Usage {
        self.usage.unwrap_or(Usage {
            input_tokens: self.fallback_input_tokens,
            output_tokens: 0,
        })
    }

    /// Put `message_start` ahead of everything held so far.
    fn ensure_message_start(&mut self) {
        if self.message_start_sent {
            return;
        }

        let usage = self.current_usage();
        let message = json!({
            "type": "message_start",
            "message": {
                "id": self.options.message_id,
                "type": "message",
                "role": "assistant",
                "model": self.options.model,
                "content": [],
                "stop_reason": null,
                "stop_sequence": null,
                "usage": {"input_tokens": usage.input_tokens, "output_tokens": 0}
            }
        });
        self.pending.insert(0, Self::emit("message_start", &message));
        self.message_start_sent = true;
    }

    /// Start a new content block, closing the open one first
    fn start_block(&mut self, block_type: BlockType, content_block: Value) {
        self.end_block();

        let index = self.block_index;
        self.push(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": index,
                "content_block": content_block
            }),
        );
        self.block_type = block_type;
    }

    /// End the current content block
    fn end_block(&mut self) {
        if self.block_type == BlockType::None {
            return;
        }

        let index = self.block_index;
        self.push(
            "content_block_stop",
            json!({ "type": "content_block_stop", "index": index }),
        );
        self.block_index += 1;
        self.block_type = BlockType::None;
        self.signature_sent = false;
    }

    fn emit_delta(&mut self, delta_type: &str, delta_content: Value) {
        let mut delta = json!({ "type": delta_type });
        if let Value::Object(map) = delta_content {
            for (k, v) in map {
                delta[k] = v;
            }
        }

        let index = self.block_index;
        self.push(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": index,
                "delta": delta
            }),
        );
    }

    /// Handle one parsed upstream chunk.
    pub fn process_chunk(&mut self, chunk: &Value) {
        if self.message_stop_sent {
            return;
        }

        let response = unwrap_response(chunk);
        let candidate = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first());

        if let Some(meta) = select_usage_metadata(response, candidate) {
            self.usage = Some(to_claude_usage(Some(meta), self.fallback_input_tokens));
            self.ensure_message_start();
        }

        if let Some(candidate) = candidate {
            for part in parse_parts(candidate) {
                PartProcessor::new(self).process(&part);
            }

            if let Some(finish_reason) = candidate.get("finishReason").and_then(|f| f.as_str()) {
                self.finish(Some(finish_reason));
            }
        }
    }

    /// Close everything and emit `message_delta` + `message_stop`.
    pub fn finish(&mut self, finish_reason: Option<&str>) {
        if self.message_stop_sent {
            return;
        }

        self.flush_thinking_text();
        self.end_block();
        self.ensure_message_start();

        let usage = self.current_usage();
        let stop_reason = map_stop_reason(finish_reason, self.used_tool);
        self.push(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": { "stop_reason": stop_reason, "stop_sequence": null },
                "usage": usage
            }),
        );
        self.push("message_stop", json!({ "type": "message_stop" }));
        self.message_stop_sent = true;
    }

    /// Terminate the stream with an `error` event.
    pub fn fail(&mut self, message: &str) {
        if self.message_stop_sent {
            return;
        }

        self.thinking_text_buffer.clear();
        self.end_block();
        self.ensure_message_start();
        self.push(
            "error",
            json!({
                "type": "error",
                "error": { "type": "api_error", "message": message }
            }),
        );
        self.message_stop_sent = true;
    }

    /// Emit buffered thoughts as wrapped text in the current (or a new) text block.
    fn flush_thinking_text(&mut self) {
        if self.thinking_text_buffer.is_empty() {
            return;
        }
        let thinking = std::mem::take(&mut self.thinking_text_buffer);
        if self.block_type != BlockType::Text {
            self.start_block(BlockType::Text, json!({ "type": "text", "text": "" }));
        }
        self.emit_delta("text_delta", json!({ "text": wrap_thinking_text(&thinking) }));
    }
}

/// Part processor - handles individual upstream parts in streaming mode
pub struct PartProcessor<'a> {
    state: &'a mut StreamingState,
}

impl<'a> PartProcessor<'a> {
    pub fn new(state: &'a mut StreamingState) -> Self {
        Self { state }
    }

    pub fn process(&mut self, part: &UpstreamPart) {
        // 1. FunctionCall handling
        if let Some(fc) = &part.function_call {
            self.process_function_call(fc);
            return;
        }

        // 2. Text handling
        if let Some(text) = &part.text {
            if part.is_thought() {
                self.process_thinking(text, part.thought_signature.as_deref());
            } else {
                self.process_text(text);
            }
            return;
        }

        // 3. InlineData (image) handling
        if let Some(img) = &part.inline_data {
            self.process_image(img);
            return;
        }

        // 4. Signature arriving on its own, after the thinking text
        if let Some(sig) = part.thought_signature.as_deref() {
            self.process_late_signature(sig);
        }
    }

    fn process_thinking(&mut self, text: &str, signature: Option<&str>) {
        let signature = signature.filter(|s| !s.is_empty());

        if !self.state.options.thinking_enabled {
            if self.state.options.thinking_to_text {
                self.state.thinking_text_buffer.push_str(text);
            }
            return;
        }

        if self.state.block_type != BlockType::Thinking {
            let mut block = json!({ "type": "thinking", "thinking": "" });
            if let Some(sig) = signature {
                block["signature"] = json!(sig);
            }
            self.state.start_block(BlockType::Thinking, block);
            self.state.signature_sent = signature.is_some();
        }

        if !text.is_empty() {
            self.state
                .emit_delta("thinking_delta", json!({ "thinking": text }));
        }

        if let Some(sig) = signature {
            self.process_late_signature(sig);
        }
    }

    fn process_late_signature(&mut self, signature: &str) {
        if signature.is_empty()
            || self.state.block_type != BlockType::Thinking
            || self.state.signature_sent
        {
            return;
        }
        self.state
            .emit_delta("signature_delta", json!({ "signature": signature }));
        self.state.signature_sent = true;
    }

    fn process_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        // Leading whitespace-only chunks carry nothing; inside an open text
        // block they are kept for formatting.
        if text.trim().is_empty()
            && self.state.block_type != BlockType::Text
            && self.state.thinking_text_buffer.is_empty()
        {
            return;
        }

        self.state.flush_thinking_text();
        if self.state.block_type != BlockType::Text {
            self.state
                .start_block(BlockType::Text, json!({ "type": "text", "text": "" }));
        }
        self.state.emit_delta("text_delta", json!({ "text": text }));
    }

    fn process_function_call(&mut self, fc: &FunctionCall) {
        self.state.flush_thinking_text();
        self.state.used_tool = true;

        let tool_id = fc
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_tool_use_id);

        self.state.start_block(
            BlockType::Function,
            json!({
                "type": "tool_use",
                "id": tool_id,
                "name": fc.name,
                "input": {}
            }),
        );

        let args = fc.args.as_ref().map(remove_nulls).unwrap_or_else(|| json!({}));
        let json_str = serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string());
        self.state
            .emit_delta("input_json_delta", json!({ "partial_json": json_str }));

        self.state.end_block();
    }

    fn process_image(&mut self, img: &InlineData) {
        if img.data.is_empty() {
            return;
        }
        self.state.flush_thinking_text();
        self.state.start_block(
            BlockType::Image,
            json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data
                }
            }),
        );
        self.state.end_block();
    }
}

/// Classification of one upstream SSE line
#[derive(Debug)]
pub enum SseLine {
    Skip,
    Done,
    Data(Value),
}

/// Parse a single SSE line. Non-data lines and malformed JSON are skipped.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) if value.is_object() => SseLine::Data(value),
        _ => SseLine::Skip,
    }
}

/// Create a Claude SSE stream from an upstream SSE byte stream.
///
/// Upstream read errors become a terminal `error` event; the stream itself
/// never yields `Err`.
pub fn create_claude_sse_stream<S, E>(
    mut upstream: S,
    options: StreamOptions,
    reporter: Option<OutcomeReporter>,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut state = StreamingState::new(options);
        let mut buffer = BytesMut::new();
        let mut reporter = reporter;
        let mut done = false;

        'read: loop {
            let next_chunk = tokio::time::timeout(HEARTBEAT_INTERVAL, upstream.next()).await;

            match next_chunk {
                Ok(Some(Ok(chunk))) => {
                    buffer.extend_from_slice(&chunk);

                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_raw = buffer.split_to(pos + 1);
                        let Ok(line) = std::str::from_utf8(&line_raw) else {
                            continue;
                        };

                        match parse_sse_line(line) {
                            SseLine::Skip => {}
                            SseLine::Done => {
                                done = true;
                                break 'read;
                            }
                            SseLine::Data(value) => {
                                if let Some(r) = reporter.take() {
                                    r.report(true);
                                }
                                state.process_chunk(&value);
                                for event in state.drain() {
                                    yield Ok(event);
                                }
                                if state.is_finished() {
                                    done = true;
                                    break 'read;
                                }
                            }
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    let message = describe_error(&e);
                    tracing::error!("Upstream stream error: {}", message);
                    state.fail(&message);
                    for event in state.drain() {
                        yield Ok(event);
                    }
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    if state.message_start_sent() {
                        yield Ok(Bytes::from(": ping\n\n"));
                    }
                }
            }
        }

        // Trailing line without a newline
        if !done && !buffer.is_empty() {
            if let Ok(line) = std::str::from_utf8(&buffer) {
                if let SseLine::Data(value) = parse_sse_line(line) {
                    if let Some(r) = reporter.take() {
                        r.report(true);
                    }
                    state.process_chunk(&value);
                }
            }
        }

        state.finish(None);
        for event in state.drain() {
            yield Ok(event);
        }
    })
}
