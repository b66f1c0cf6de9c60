//! # Refdesk Retrieval
//!
//! The ranked-retrieval and result-deduplication engine: the only part
//! of the pipeline with real invariants. Given a question embedding,
//! a business category and the page ranges the TOC-guided first pass
//! already covered, it probes both collections, collapses duplicate
//! pages/entries, suppresses excluded pages, truncates to the
//! configured caps and returns distance-ordered evidence for the
//! generation stage.
//!
//! Guarantees per `search` call:
//! - at most `manual_top_k` / `faq_top_k` records per collection
//! - no two records share a dedup identity key
//! - no record falls inside an exclusion range
//! - each list is non-decreasing in distance
//! - text lists mirror the records index-for-index

pub mod engine;
pub mod prompt;
pub mod toc_reply;

pub use engine::{SearchEngine, SearchOptions};
pub use toc_reply::{PdfReference, describe_ranges, parse_page_ranges};
