//! LLM and media-understanding clients.

pub mod model;
pub mod providers;

pub use model::{ChatMessage, ChatRole, LlmProvider, MediaUnderstanding};
