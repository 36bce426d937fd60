//! Comment generation over an OpenAI-compatible chat-completions API.

use thiserror::Error;

/// Shared request/response plumbing
pub mod http_utils;
/// `OpenRouter` backed [`CommentGenerator`](crate::commenter::CommentGenerator)
pub mod openrouter;
/// Prompt construction and completion clean-up
pub mod prompt;

pub use openrouter::OpenRouterCommenter;

/// Errors that can occur when calling the LLM API
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Completion contained no usable text
    #[error("Empty response")]
    EmptyResponse,
}
