//! One request/response cycle: capture, transcribe, generate, synthesize
//!
//! Capture and transcription failures stop the interaction before anything is
//! recorded. Generation failures turn into the fallback reply and synthesis
//! failures into a text-only result; both still reach [`Stage::Presented`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::artifact::{ArtifactStore, SynthesisArtifact};
use crate::error::{CaptureError, GenerationError, SynthesisError, TranscriptionError};
use crate::llm::ResponseGenerator;
use crate::session::Session;
use crate::voice::capture::{CaptureConfig, CaptureStrategy};
use crate::voice::clip::AudioClip;
use crate::voice::stt::Transcriber;
use crate::voice::tts::Synthesizer;

/// Message shown for blank text input
pub const EMPTY_INPUT_MESSAGE: &str = "Please enter a valid message.";

/// Steps an interaction passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capturing,
    Transcribing,
    Generating,
    Synthesizing,
    Presented,
}

/// Reply delivered to the caller
#[derive(Debug, Clone)]
pub struct Presentation {
    /// What the user said or typed
    pub user_text: String,
    /// Assistant reply, possibly the fallback text
    pub reply: String,
    /// Set when the reply is the fallback
    pub generation_error: Option<GenerationError>,
    /// Set when no audio could be produced
    pub synthesis_error: Option<SynthesisError>,
    /// Spoken reply
    pub artifact: Option<SynthesisArtifact>,
    /// Where the spoken reply was saved, if a store is configured
    pub artifact_path: Option<PathBuf>,
}

impl Presentation {
    /// Non-fatal problems worth showing next to the reply
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(e) = &self.generation_error {
            warnings.push(e.to_string());
        }
        if let Some(e) = &self.synthesis_error {
            warnings.push(format!("{e}; showing text only"));
        }
        warnings
    }
}

/// How an interaction ended
#[derive(Debug, Clone)]
pub enum Outcome {
    /// No clip was obtained
    CaptureFailed(CaptureError),
    /// The clip could not be turned into text
    TranscriptionFailed(TranscriptionError),
    /// Typed input was blank
    EmptyInput,
    /// A reply was produced
    Presented(Presentation),
}

impl Outcome {
    #[must_use]
    pub const fn presentation(&self) -> Option<&Presentation> {
        match self {
            Self::Presented(p) => Some(p),
            _ => None,
        }
    }

    /// User-facing message for an interaction that stopped early
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::CaptureFailed(e) => Some(e.to_string()),
            Self::TranscriptionFailed(e) => Some(e.to_string()),
            Self::EmptyInput => Some(EMPTY_INPUT_MESSAGE.to_string()),
            Self::Presented(_) => None,
        }
    }
}

/// Record of a single request/response cycle
#[derive(Debug, Clone)]
pub struct Interaction {
    /// Unique per interaction; keys the stored artifact
    pub id: Uuid,
    /// Stages entered, in order
    pub stages: Vec<Stage>,
    pub outcome: Outcome,
}

impl Interaction {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stages: Vec::new(),
            outcome: Outcome::EmptyInput,
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(interaction = %self.id, ?stage, "entering stage");
        self.stages.push(stage);
    }

    fn finish(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Orchestrates the stages of an interaction against a session
#[derive(Clone)]
pub struct Pipeline {
    transcriber: Option<Arc<dyn Transcriber>>,
    generator: ResponseGenerator,
    synthesizer: Arc<dyn Synthesizer>,
    artifacts: Option<ArtifactStore>,
}

impl Pipeline {
    /// Create a text-only pipeline
    #[must_use]
    pub fn new(generator: ResponseGenerator, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            transcriber: None,
            generator,
            synthesizer,
            artifacts: None,
        }
    }

    /// Enable voice input
    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Persist every spoken reply
    #[must_use]
    pub fn with_artifact_store(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    #[must_use]
    pub fn has_transcriber(&self) -> bool {
        self.transcriber.is_some()
    }

    #[must_use]
    pub const fn artifact_store(&self) -> Option<&ArtifactStore> {
        self.artifacts.as_ref()
    }

    /// Capture a clip with `capture`, then run it through the rest of the pipeline
    pub async fn run_voice(
        &self,
        session: &mut Session,
        capture: &mut dyn CaptureStrategy,
        config: &CaptureConfig,
    ) -> Interaction {
        let mut interaction = Interaction::new();
        interaction.enter(Stage::Capturing);

        match capture.capture(config).await {
            Ok(clip) => {
                tracing::debug!(
                    source = ?clip.source(),
                    seconds = clip.duration().as_secs_f32(),
                    "clip captured"
                );
                self.transcribe_and_respond(session, interaction, &clip).await
            }
            Err(e) => {
                tracing::warn!(interaction = %interaction.id, error = %e, "capture failed");
                interaction.finish(Outcome::CaptureFailed(e))
            }
        }
    }

    /// Run an already-captured clip through the pipeline
    pub async fn run_clip(&self, session: &mut Session, clip: &AudioClip) -> Interaction {
        let interaction = Interaction::new();
        self.transcribe_and_respond(session, interaction, clip).await
    }

    /// Respond to typed input
    pub async fn run_text(&self, session: &mut Session, text: &str) -> Interaction {
        let interaction = Interaction::new();
        let text = text.trim();
        if text.is_empty() {
            return interaction.finish(Outcome::EmptyInput);
        }
        self.respond(session, interaction, text.to_string()).await
    }

    async fn transcribe_and_respond(
        &self,
        session: &mut Session,
        mut interaction: Interaction,
        clip: &AudioClip,
    ) -> Interaction {
        interaction.enter(Stage::Transcribing);

        let Some(transcriber) = &self.transcriber else {
            return interaction.finish(Outcome::TranscriptionFailed(
                TranscriptionError::ServiceUnavailable("no speech recognizer configured".to_string()),
            ));
        };

        match transcriber.transcribe(clip, session.input_language).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(
                    interaction = %interaction.id,
                    provider = transcriber.name(),
                    "blank transcript"
                );
                interaction.finish(Outcome::TranscriptionFailed(TranscriptionError::Unintelligible))
            }
            Ok(text) => self.respond(session, interaction, text.trim().to_string()).await,
            Err(e) => {
                tracing::warn!(
                    interaction = %interaction.id,
                    provider = transcriber.name(),
                    error = %e,
                    "transcription failed"
                );
                interaction.finish(Outcome::TranscriptionFailed(e))
            }
        }
    }

    async fn respond(
        &self,
        session: &mut Session,
        mut interaction: Interaction,
        user_text: String,
    ) -> Interaction {
        interaction.enter(Stage::Generating);
        let reply = self.generator.generate(&mut session.history, &user_text).await;

        // The fallback reply is spoken too
        interaction.enter(Stage::Synthesizing);
        let (artifact, synthesis_error) = match self
            .synthesizer
            .synthesize(&reply.text, session.output_language)
            .await
        {
            Ok(artifact) => (Some(artifact), None),
            Err(e) => {
                tracing::warn!(
                    interaction = %interaction.id,
                    provider = self.synthesizer.name(),
                    error = %e,
                    "synthesis failed"
                );
                (None, Some(e))
            }
        };

        let artifact_path = match (&self.artifacts, &artifact) {
            (Some(store), Some(artifact)) => {
                match store.save(session.id(), interaction.id, artifact).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!(interaction = %interaction.id, error = %e, "failed to save artifact");
                        None
                    }
                }
            }
            _ => None,
        };

        session.latest_artifact.clone_from(&artifact);
        interaction.enter(Stage::Presented);
        tracing::info!(
            session = %session.id(),
            interaction = %interaction.id,
            fallback = reply.is_fallback(),
            spoken = artifact.is_some(),
            "interaction presented"
        );

        interaction.finish(Outcome::Presented(Presentation {
            user_text,
            reply: reply.text,
            generation_error: reply.error,
            synthesis_error,
            artifact,
            artifact_path,
        }))
    }
}
