//! # Refdesk Gateway
//!
//! HTTP/WebSocket surface. One WebSocket endpoint drives the whole
//! two-stage answer flow; a small REST surface lists categories and
//! serves the source PDFs the answers link to.

pub mod pdf;
pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, build_router, run};
