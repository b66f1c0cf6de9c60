//! Error taxonomy shared across the workspace.
//!
//! - `Validation` fails a single request before any query executes.
//! - `Retrieval` means the vector store could not answer; the caller
//!   may retry the whole request, the engine never retries internally.
//! - Unresolved document provenance is NOT an error: the engine
//!   degrades to a null file name and keeps going.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Debug, Error)]
pub enum RefdeskError {
    /// Bad caller input (missing category, wrong embedding dimension).
    #[error("validation error: {0}")]
    Validation(String),

    /// The vector store is unavailable or a query failed/timed out.
    #[error("retrieval unavailable: {0}")]
    Retrieval(String),

    /// Embedding or generation service failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Transport-level HTTP failure talking to an external service.
    #[error("http error: {0}")]
    Http(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed upstream payload (model output, SSE frame).
    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RefdeskError>;
