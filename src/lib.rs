//! Polyglot Voice - multilingual voice conversation pipeline
//!
//! This library provides the core of a spoken or typed conversation with a
//! language model:
//! - Audio capture (blocking microphone, streaming frames, fixed-length file)
//! - Speech-to-text and text-to-speech adapters
//! - Bounded-context conversation history and prompt assembly
//! - A pipeline tying the stages into one request/response cycle
//! - A terminal chat and an HTTP API on top of it
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        CLI chat        │        HTTP API            │
//! └────────────────────┬────────────────────────────────┘
//!                      │  Session (history + languages)
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Pipeline                         │
//! │  Capture → Transcribe → Generate → Synthesize        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Hosted backends                       │
//! │   Whisper/Deepgram  │  Gemini  │  Google/OpenAI TTS  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod artifact;
pub mod config;
pub mod conversation;
pub mod error;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod voice;

pub use artifact::{ArtifactStore, AudioFormat, SynthesisArtifact};
pub use config::Config;
pub use conversation::{ConversationHistory, ConversationTurn, Role};
pub use error::{
    CaptureError, Error, GenerationError, Result, SynthesisError, TranscriptionError,
};
pub use language::Language;
pub use llm::{LanguageModel, ResponseGenerator};
pub use pipeline::{Interaction, Outcome, Pipeline, Presentation, Stage};
pub use session::{Session, SessionStore};
