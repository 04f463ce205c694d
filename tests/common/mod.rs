//! Shared test utilities
//!
//! In-process stand-ins for every backend so no test needs audio hardware
//! or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polyglot_voice::artifact::{AudioFormat, SynthesisArtifact};
use polyglot_voice::error::{CaptureError, GenerationError, SynthesisError, TranscriptionError};
use polyglot_voice::llm::{LanguageModel, ResponseGenerator};
use polyglot_voice::voice::capture::{CaptureConfig, CaptureStrategy, FrameSink, FrameSource};
use polyglot_voice::voice::clip::{AudioClip, CaptureSource, SAMPLE_RATE};
use polyglot_voice::voice::stt::Transcriber;
use polyglot_voice::voice::tts::Synthesizer;
use polyglot_voice::{Language, Pipeline};

/// Language model answering from a script, recording every prompt
#[derive(Default)]
pub struct ScriptedModel {
    answers: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Answers each prompt with the next scripted result, then echoes
    pub fn new(answers: impl IntoIterator<Item = Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Echoes every prompt's user text
    pub fn echo() -> Arc<Self> {
        Self::new([])
    }

    pub fn failing() -> Arc<Self> {
        Self::new([Err(GenerationError::BackendFailure("model offline".to_string()))])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().last().cloned().expect("no prompt recorded")
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        // Give concurrent requests a chance to run mid-generation
        tokio::task::yield_now().await;
        self.answers.lock().unwrap().pop_front().unwrap_or_else(|| {
            let user_line = prompt.lines().rev().nth(1).unwrap_or_default();
            Ok(format!("echo {}", user_line.trim_start_matches("User: ")))
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Transcriber returning a fixed result
pub struct FakeTranscriber {
    result: Result<String, TranscriptionError>,
    calls: AtomicUsize,
    languages: Mutex<Vec<Language>>,
}

impl FakeTranscriber {
    pub fn hearing(text: &str) -> Arc<Self> {
        Self::with_result(Ok(text.to_string()))
    }

    pub fn with_result(result: Result<String, TranscriptionError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn languages(&self) -> Vec<Language> {
        self.languages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        language: Language,
    ) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().unwrap().push(language);
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Synthesizer producing placeholder MP3 bytes, or failing on demand
pub struct FakeSynthesizer {
    fail: std::sync::atomic::AtomicBool,
    calls: AtomicUsize,
    texts: Mutex<Vec<(String, Language)>>,
}

impl FakeSynthesizer {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: std::sync::atomic::AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        let synth = Self::working();
        synth.set_failing(true);
        synth
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<(String, Language)> {
        self.texts.lock().unwrap().clone()
    }
}

/// Bytes the fake synthesizer returns for `text`
pub fn fake_audio(text: &str) -> Vec<u8> {
    let mut audio = b"ID3".to_vec();
    audio.extend_from_slice(text.as_bytes());
    audio
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
    ) -> Result<SynthesisArtifact, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push((text.to_string(), language));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::BackendFailure("voice offline".to_string()));
        }
        Ok(SynthesisArtifact::new(fake_audio(text), AudioFormat::Mp3, language))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Capture strategy returning a fixed result
pub struct FakeCapture {
    result: Result<AudioClip, CaptureError>,
}

impl FakeCapture {
    pub fn clip() -> Self {
        Self {
            result: Ok(speech_clip()),
        }
    }

    pub fn failing(error: CaptureError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl CaptureStrategy for FakeCapture {
    async fn capture(&mut self, _config: &CaptureConfig) -> Result<AudioClip, CaptureError> {
        self.result.clone()
    }

    fn source(&self) -> CaptureSource {
        CaptureSource::Microphone
    }
}

/// Frame source that starts but never delivers a frame
#[derive(Default)]
pub struct SilentSource {
    sink: Option<FrameSink>,
}

impl FrameSource for SilentSource {
    fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink = None;
    }
}

/// Half a second of a 440Hz tone at the pipeline rate
pub fn speech_clip() -> AudioClip {
    #[allow(clippy::cast_precision_loss)]
    let samples = (0..SAMPLE_RATE / 2)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.5)
        .collect();
    AudioClip::new(samples, SAMPLE_RATE, CaptureSource::Microphone)
}

/// Capture config with short stream timeouts
pub fn fast_capture_config() -> CaptureConfig {
    CaptureConfig {
        onset_timeout: std::time::Duration::from_millis(50),
        drain_timeout: std::time::Duration::from_millis(50),
        drain_budget: std::time::Duration::from_millis(500),
        ..CaptureConfig::default()
    }
}

/// Pipeline over fake backends
pub fn test_pipeline(
    model: Arc<ScriptedModel>,
    synth: Arc<FakeSynthesizer>,
    transcriber: Option<Arc<FakeTranscriber>>,
) -> Pipeline {
    let pipeline = Pipeline::new(ResponseGenerator::new(model), synth);
    match transcriber {
        Some(t) => pipeline.with_transcriber(t),
        None => pipeline,
    }
}
