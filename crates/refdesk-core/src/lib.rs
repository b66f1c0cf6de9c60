//! # Refdesk Core
//!
//! Shared foundation for the Refdesk workspace: configuration, the
//! error taxonomy, result/exclusion types, the business-category
//! resolver, and the capability traits (`DocumentIndex`, `Embedder`,
//! `Generator`) that the retrieval engine and gateway depend on.
//!
//! All collaborators are injected through these traits — there are no
//! module-level clients or pools anywhere in the workspace.

pub mod category;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use category::CategoryMap;
pub use config::RefdeskConfig;
pub use error::{RefdeskError, Result};
