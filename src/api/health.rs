//! Health check endpoint

use axum::{Json, Router, routing::get};
use serde::Serialize;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Build health router
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
