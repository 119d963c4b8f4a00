// Claude mapper module
// Handles Claude/Anthropic ↔ Antigravity protocol conversion

pub mod models;
pub mod request;
pub mod response;
pub mod streaming;

pub use models::*;
pub use request::{
    build_upstream_payload, convert_claude_request, estimate_token_count, is_greeting_probe,
    ConvertedRequest,
};
pub use response::{convert_response, greeting_response, new_message_id};
pub use streaming::{create_claude_sse_stream, StreamOptions};
