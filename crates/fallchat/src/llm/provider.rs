//! LLM provider trait.

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse, ChatStream};

/// A chat-completion backend.
///
/// Implementations own the wire protocol and authentication for one upstream.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a blocking chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Start a streaming chat completion request.
    ///
    /// Returning `Ok` means the upstream accepted the request; fragments are
    /// pulled from the returned stream.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;
}
