//! Error types for the voice pipeline
//!
//! Every pipeline stage has its own error enum so the orchestrator can tell
//! hard stops (capture, transcription) from soft failures (generation,
//! synthesis). [`Error`] wraps them for code outside the pipeline.

use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside a single interaction
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio encoding, decoding or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Unsupported language code or name
    #[error("unsupported language: {0}")]
    Language(String),

    /// Session lookup failed
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// Capture stage failure
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Transcription stage failure
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    /// Generation stage failure
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Synthesis stage failure
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Audio capture failures. Terminal for the interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No input device could be opened
    #[error("no audio input device available")]
    NoDeviceAvailable,

    /// No speech started before the listen timeout
    #[error("timed out waiting for speech")]
    ListenTimeout,

    /// The stream delivered no frames
    #[error("no audio detected")]
    NoAudioDetected,

    /// Device or driver failure while recording
    #[error("recording failed: {0}")]
    RecordingError(String),
}

/// Speech-to-text failures. Terminal for the interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    /// The backend could not resolve any speech
    #[error("could not understand the audio")]
    Unintelligible,

    /// Transport or backend failure
    #[error("speech recognition unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Language-model failures. Absorbed into a fallback reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The backend failed or returned nothing usable
    #[error("language model failed: {0}")]
    BackendFailure(String),
}

/// Speech synthesis failures. Absorbed by presenting text only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// The backend failed or rejected the input
    #[error("speech synthesis failed: {0}")]
    BackendFailure(String),
}
