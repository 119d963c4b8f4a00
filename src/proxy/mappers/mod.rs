// Mappers - protocol converters
// Convert between the Anthropic/OpenAI client formats and the Antigravity upstream format

pub mod claude;
pub mod openai;
