//! Axum server wiring: shared state, router, listener.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use refdesk_core::config::{GatewayConfig, PdfConfig};
use refdesk_core::error::{RefdeskError, Result};
use refdesk_core::traits::{Embedder, Generator};
use refdesk_retrieval::SearchEngine;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub gateway_config: GatewayConfig,
    pub pdf_config: PdfConfig,
    pub start_time: std::time::Instant,
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.gateway_config);
    let shared = Arc::new(state);

    Router::new()
        .route("/ws", get(super::ws::ws_handler))
        .route("/categories", get(super::routes::list_categories))
        .route("/health", get(super::routes::health))
        .route(
            "/pdf/{doc_type}/{category}/{file_name}",
            get(super::pdf::serve_pdf),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve until shutdown.
pub async fn run(state: AppState) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.gateway_config.host, state.gateway_config.port
    );
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RefdeskError::Config(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| RefdeskError::Http(format!("server error: {e}")))?;
    Ok(())
}
