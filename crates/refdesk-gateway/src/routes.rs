//! REST routes: category listing and liveness.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use super::server::AppState;

/// Categories that are both configured and present in the store,
/// keyed by display name.
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.engine.available_categories().await {
        Ok(categories) => Ok(Json(json!({ "categories": categories }))),
        Err(e) => {
            tracing::error!(error = %e, "failed to list categories");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to list categories" })),
            ))
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
