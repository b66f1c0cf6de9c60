//! External model services: embeddings and streamed completions.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Stream of answer fragments; ends when the underlying completion
/// signals end-of-stream or the client goes away.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Dense-vector embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text. Must reject empty input rather than silently
    /// embedding an empty string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Streaming text-completion service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn stream_chat(&self, system_prompt: &str, user_question: &str) -> Result<TokenStream>;
}
