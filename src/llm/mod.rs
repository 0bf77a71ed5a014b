//! LLM module - Language Model integrations
//!
//! Provides the provider abstraction used by the reasoning oracle, with
//! Ollama as the backend.

pub mod ollama;
pub mod traits;

pub use ollama::OllamaClient;
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};
