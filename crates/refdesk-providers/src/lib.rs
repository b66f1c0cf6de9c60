//! # Refdesk Providers
//!
//! Azure OpenAI implementations of the `Embedder` and `Generator`
//! capabilities. Embeddings go through the deployments embeddings
//! endpoint; chat goes through the streaming chat-completions endpoint
//! and is surfaced as a token stream.

pub mod azure;

pub use azure::AzureOpenAi;
