// OpenAI mapper module
// Handles OpenAI chat completions ↔ Antigravity protocol conversion

pub mod models;
pub mod request;
pub mod response;
pub mod streaming;

pub use models::*;
pub use request::convert_openai_request;
pub use response::convert_openai_response;
pub use streaming::create_openai_sse_stream;
