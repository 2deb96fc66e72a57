mod client;
pub mod prompts;

pub use client::{sanitize_response, strip_code_fences, ChatMessage, LmStudioClient, ModelEntry};
