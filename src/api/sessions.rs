//! Session and interaction endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::conversation::Role;
use crate::error::{CaptureError, TranscriptionError};
use crate::language::Language;
use crate::pipeline::{Interaction, Outcome, Stage};
use crate::session::SessionHandle;
use crate::voice::clip::{AudioClip, CaptureSource, SAMPLE_RATE};

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/languages", get(languages))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", axum::routing::delete(delete_session))
        .route("/sessions/{id}/history", get(history))
        .route("/sessions/{id}/messages", post(send_message))
        .route("/sessions/{id}/audio", post(send_audio))
        .route("/sessions/{id}/artifact", get(artifact))
        .with_state(state)
}

/// One supported language
#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
}

/// List supported languages
async fn languages() -> Json<Vec<LanguageInfo>> {
    Json(
        Language::ALL
            .iter()
            .map(|l| LanguageInfo {
                code: l.code(),
                name: l.name(),
            })
            .collect(),
    )
}

/// Session creation request; languages default to English
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub input_language: Option<String>,
    pub output_language: Option<String>,
}

/// Created session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub input_language: Language,
    pub output_language: Language,
}

fn parse_language(value: Option<&str>) -> Result<Language, ApiError> {
    value.map_or(Ok(Language::default()), |v| {
        v.parse().map_err(|e: crate::Error| ApiError::BadRequest(e.to_string()))
    })
}

async fn create_session(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let input_language = parse_language(request.input_language.as_deref())?;
    let output_language = parse_language(request.output_language.as_deref())?;

    let handle = state.sessions.create(input_language, output_language).await;
    let id = handle.lock().await.id();

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            id,
            input_language,
            output_language,
        }),
    ))
}

async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.sessions.remove(id).await {
        return Err(ApiError::NotFound("session not found"));
    }

    if let Some(store) = state.pipeline.artifact_store() {
        if let Err(e) = store.remove_session(id).await {
            tracing::warn!(session = %id, error = %e, "failed to remove session artifacts");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn find_session(state: &ApiState, id: Uuid) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or(ApiError::NotFound("session not found"))
}

/// One turn as shown to clients
#[derive(Debug, Serialize)]
pub struct TurnView {
    pub role: Role,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

async fn history(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TurnView>>, ApiError> {
    let handle = find_session(&state, id).await?;
    let session = handle.lock().await;

    Ok(Json(
        session
            .history
            .full()
            .iter()
            .map(|t| TurnView {
                role: t.role(),
                text: t.text().to_string(),
                created_at: t.created_at(),
            })
            .collect(),
    ))
}

/// Typed message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Result of a presented interaction
#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub interaction_id: Uuid,
    pub stages: Vec<Stage>,
    pub user_text: String,
    pub reply: String,
    /// Non-fatal problems (fallback reply, missing audio)
    pub warnings: Vec<String>,
    /// Download URL when the reply was spoken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
}

fn into_response(session_id: Uuid, interaction: Interaction) -> Result<Json<InteractionResponse>, ApiError> {
    match interaction.outcome {
        Outcome::Presented(presentation) => Ok(Json(InteractionResponse {
            interaction_id: interaction.id,
            stages: interaction.stages,
            warnings: presentation.warnings(),
            artifact_url: presentation
                .artifact
                .as_ref()
                .map(|_| format!("/api/sessions/{session_id}/artifact")),
            user_text: presentation.user_text,
            reply: presentation.reply,
        })),
        Outcome::EmptyInput => Err(ApiError::BadRequest(crate::pipeline::EMPTY_INPUT_MESSAGE.to_string())),
        Outcome::CaptureFailed(e) => Err(ApiError::CaptureFailed(e.to_string())),
        Outcome::TranscriptionFailed(e @ TranscriptionError::Unintelligible) => {
            Err(ApiError::Unintelligible(e.to_string()))
        }
        Outcome::TranscriptionFailed(e @ TranscriptionError::ServiceUnavailable(_)) => {
            Err(ApiError::TranscriptionUnavailable(e.to_string()))
        }
    }
}

async fn send_message(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<InteractionResponse>, ApiError> {
    let handle = find_session(&state, id).await?;
    let mut session = handle.lock().await;

    let interaction = state.pipeline.run_text(&mut session, &request.text).await;
    into_response(id, interaction)
}

/// Run a pre-recorded WAV clip through the pipeline
async fn send_audio(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<InteractionResponse>, ApiError> {
    let handle = find_session(&state, id).await?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("empty audio data".to_string()));
    }

    let limit = state.clip_limit;
    let clip = tokio::task::spawn_blocking(move || decode_upload(&body, limit))
        .await
        .map_err(|e| ApiError::BadRequest(format!("audio decode failed: {e}")))??;

    let mut session = handle.lock().await;
    let interaction = state.pipeline.run_clip(&mut session, &clip).await;
    into_response(id, interaction)
}

/// Decode an uploaded WAV into a pipeline-rate clip no longer than `limit`
fn decode_upload(body: &[u8], limit: Duration) -> Result<AudioClip, ApiError> {
    let clip = AudioClip::from_wav(body, CaptureSource::File)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if clip.is_empty() {
        return Err(ApiError::CaptureFailed(CaptureError::NoAudioDetected.to_string()));
    }
    if clip.duration() > limit {
        return Err(ApiError::BadRequest(format!(
            "audio longer than {} seconds",
            limit.as_secs()
        )));
    }

    clip.resampled(SAMPLE_RATE)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Download the latest spoken reply
async fn artifact(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, id).await?;
    let session = handle.lock().await;

    let artifact = session
        .latest_artifact
        .as_ref()
        .ok_or(ApiError::NotFound("no audio for the latest reply"))?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.format().mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.audio().to_vec(),
    )
        .into_response())
}
