//! Voice processing module
//!
//! Handles audio capture, utterance detection, speech recognition, speech
//! synthesis and playback.

pub mod capture;
pub mod clip;
mod playback;
pub mod stt;
pub mod tts;
pub mod vad;

pub use capture::{CaptureConfig, CaptureStrategy};
pub use clip::{AudioClip, CaptureSource, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{Synthesizer, TextToSpeech};
pub use vad::{DetectorState, UtteranceDetector};
