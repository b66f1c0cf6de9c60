//! Source PDF delivery for answer links.
//!
//! Files live under `{data_dir}/{manual|faq}/{category}/{file_name}`.
//! Path segments come straight from the URL, so each one is rejected
//! if it could escape its directory.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde_json::json;

use refdesk_core::types::DocumentKind;

use super::server::AppState;

fn error_response(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "error": message }).to_string()))
        .unwrap_or_default()
}

/// A single path segment: no separators, no parent references.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains('\0')
}

pub async fn serve_pdf(
    State(state): State<Arc<AppState>>,
    Path((doc_type, category, file_name)): Path<(String, String, String)>,
) -> Response {
    let Ok(kind) = doc_type.parse::<DocumentKind>() else {
        return error_response(StatusCode::BAD_REQUEST, "invalid document type");
    };
    if kind == DocumentKind::Toc {
        return error_response(StatusCode::BAD_REQUEST, "invalid document type");
    }
    if !is_safe_segment(&category) || !is_safe_segment(&file_name) {
        return error_response(StatusCode::BAD_REQUEST, "invalid path");
    }

    let path: PathBuf = [
        state.pdf_config.data_dir.as_str(),
        kind.as_str(),
        &category,
        &file_name,
    ]
    .iter()
    .collect();

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), size = bytes.len(), "serving pdf");
            let disposition = format!(
                "inline; filename*=UTF-8''{}",
                percent_encode(&file_name)
            );
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/pdf")
                .header(
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_str(&disposition)
                        .unwrap_or_else(|_| HeaderValue::from_static("inline")),
                )
                .body(Body::from(bytes))
                .unwrap_or_default()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "pdf not found");
            error_response(StatusCode::NOT_FOUND, "pdf not found")
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read pdf");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read pdf")
        }
    }
}

/// RFC 5987 percent-encoding for the filename parameter.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
