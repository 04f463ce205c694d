//! HTTP API for browser and remote clients
//!
//! Every session is addressed by UUID. Interactions on one session are
//! serialized by the session lock; different sessions run concurrently.

pub mod health;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;
use crate::session::SessionStore;
use crate::voice::capture::CaptureConfig;
use crate::Result;

/// Shared state for API handlers
pub struct ApiState {
    /// Live sessions
    pub sessions: SessionStore,
    /// Stage orchestration for every interaction
    pub pipeline: Pipeline,
    /// Longest uploaded clip accepted
    pub clip_limit: Duration,
}

impl ApiState {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            sessions: SessionStore::new(),
            pipeline,
            clip_limit: CaptureConfig::default().phrase_limit,
        }
    }

    #[must_use]
    pub fn with_clip_limit(mut self, limit: Duration) -> Self {
        self.clip_limit = limit;
        self
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    // CORS layer for cross-origin requests from a browser frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", sessions::router(state))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// HTTP API server
pub struct ApiServer {
    state: ApiState,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(pipeline: Pipeline, port: u16) -> Self {
        Self {
            state: ApiState::new(pipeline),
            port,
        }
    }

    /// Cap the length of uploaded clips
    #[must_use]
    pub fn with_clip_limit(mut self, limit: Duration) -> Self {
        self.state = self.state.with_clip_limit(limit);
        self
    }

    /// Run the API server until it fails or the process is stopped
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            voice = self.state.pipeline.has_transcriber(),
            "API server listening"
        );

        axum::serve(listener, router(Arc::new(self.state)))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down API server");
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    CaptureFailed(String),
    Unintelligible(String),
    TranscriptionUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.to_string()),
            Self::CaptureFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "capture_failed", msg),
            Self::Unintelligible(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "unintelligible", msg),
            Self::TranscriptionUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "transcription_unavailable", msg)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
            }),
        )
            .into_response()
    }
}
