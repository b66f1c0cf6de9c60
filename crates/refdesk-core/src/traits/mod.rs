//! Capability traits at the seams of the system.
//!
//! The retrieval engine and gateway depend on these, never on the
//! concrete sqlx/reqwest implementations, so tests can substitute
//! doubles without process-wide state.

pub mod index;
pub mod provider;

pub use index::DocumentIndex;
pub use provider::{Embedder, Generator, TokenStream};
