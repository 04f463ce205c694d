//! Configuration management
//!
//! Values are layered lowest to highest: built-in defaults, the optional TOML
//! file, then environment variables.

pub mod file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::artifact::ArtifactStore;
use crate::conversation::DEFAULT_CONTEXT_WINDOW;
use crate::llm::{self, GeminiClient, LanguageModel, ResponseGenerator};
use crate::pipeline::Pipeline;
use crate::voice::capture::CaptureConfig;
use crate::voice::stt::{SpeechToText, Transcriber};
use crate::voice::tts::{Synthesizer, TextToSpeech};
use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Speech recognition backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProviderKind {
    #[default]
    Whisper,
    Deepgram,
}

impl SttProviderKind {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
        }
    }
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProviderKind {
    #[default]
    Google,
    OpenAI,
    ElevenLabs,
}

impl TtsProviderKind {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }

    const fn default_voice(self) -> &'static str {
        match self {
            Self::Google => "",
            Self::OpenAI => "alloy",
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::Google => "",
            Self::OpenAI => "tts-1",
            Self::ElevenLabs => "eleven_multilingual_v2",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Language model settings
    pub llm: LlmConfig,

    /// Speech recognition and synthesis settings
    pub voice: VoiceConfig,

    /// Capture tunables
    pub capture: CaptureConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Directory synthesized replies are written to
    pub artifact_dir: PathBuf,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Gemini model identifier
    pub model: String,

    /// Prior turns included in each prompt
    pub context_window: usize,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt_provider: SttProviderKind,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsProviderKind,

    /// Voice name or ID for keyed TTS providers
    pub tts_voice: String,

    /// TTS model for keyed providers
    pub tts_model: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Google API key (Gemini)
    pub google: Option<SecretString>,

    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// Platform directories for this application
pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "polyglot-voice")
}

fn default_artifact_dir() -> PathBuf {
    project_dirs().map_or_else(
        || PathBuf::from("artifacts"),
        |d| d.data_dir().join("artifacts"),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn secs(value: Option<f64>, default: Duration) -> Duration {
    value
        .filter(|s| s.is_finite() && *s > 0.0)
        .map_or(default, Duration::from_secs_f64)
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn load() -> Result<Self> {
        let path = std::env::var("POLYGLOT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration using the config file at `path`, or the default location
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn load_from(path: Option<&std::path::Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn from_sources(
        fc: file::ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| non_empty(env(key));

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            google: var("GOOGLE_API_KEY")
                .or_else(|| non_empty(fc.api_keys.google))
                .map(SecretString::from),
            openai: var("OPENAI_API_KEY").or_else(|| non_empty(fc.api_keys.openai)),
            deepgram: var("DEEPGRAM_API_KEY").or_else(|| non_empty(fc.api_keys.deepgram)),
            elevenlabs: var("ELEVENLABS_API_KEY").or_else(|| non_empty(fc.api_keys.elevenlabs)),
        };

        let context_window = match var("POLYGLOT_CONTEXT_WINDOW") {
            Some(s) => s.trim().parse().map_err(|_| {
                Error::Config(format!("POLYGLOT_CONTEXT_WINDOW must be a number, got {s:?}"))
            })?,
            None => fc.llm.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW),
        };

        let llm = LlmConfig {
            model: var("POLYGLOT_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| llm::DEFAULT_MODEL.to_string()),
            context_window,
        };

        // Voice config (env > toml > provider default)
        let stt_provider = var("POLYGLOT_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|s| SttProviderKind::parse(&s))
            .transpose()?
            .unwrap_or_default();
        let tts_provider = var("POLYGLOT_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|s| TtsProviderKind::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let voice = VoiceConfig {
            stt_provider,
            stt_model: var("POLYGLOT_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            tts_provider,
            tts_voice: var("POLYGLOT_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            tts_model: fc
                .voice
                .tts_model
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
        };

        let defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            calibration: secs(fc.capture.calibration_secs, defaults.calibration),
            listen_timeout: secs(fc.capture.listen_timeout_secs, defaults.listen_timeout),
            phrase_limit: secs(fc.capture.phrase_limit_secs, defaults.phrase_limit),
            record_duration: secs(fc.capture.record_secs, defaults.record_duration),
            onset_timeout: secs(fc.capture.onset_timeout_secs, defaults.onset_timeout),
            drain_budget: secs(fc.capture.drain_budget_secs, defaults.drain_budget),
            ..defaults
        };

        let port = match var("POLYGLOT_PORT") {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("POLYGLOT_PORT must be a port number, got {s:?}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let artifact_dir = var("POLYGLOT_ARTIFACT_DIR")
            .map(PathBuf::from)
            .or(fc.artifact_dir)
            .unwrap_or_else(default_artifact_dir);

        tracing::debug!(
            llm_model = %llm.model,
            context_window = llm.context_window,
            stt = ?voice.stt_provider,
            tts = ?voice.tts_provider,
            artifact_dir = %artifact_dir.display(),
            "configuration loaded"
        );

        Ok(Self {
            llm,
            voice,
            capture,
            api_keys,
            server: ServerConfig { port },
            artifact_dir,
        })
    }

    /// Build the language model client
    ///
    /// # Errors
    ///
    /// Returns error if `GOOGLE_API_KEY` is not set
    pub fn language_model(&self) -> Result<Arc<dyn LanguageModel>> {
        let client = GeminiClient::new(self.api_keys.google.clone(), self.llm.model.clone())?;
        Ok(Arc::new(client))
    }

    /// Build the speech recognizer, or `None` when its key is missing
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot be constructed
    pub fn transcriber(&self) -> Result<Option<Arc<dyn Transcriber>>> {
        let (key, name) = match self.voice.stt_provider {
            SttProviderKind::Whisper => (&self.api_keys.openai, "OPENAI_API_KEY"),
            SttProviderKind::Deepgram => (&self.api_keys.deepgram, "DEEPGRAM_API_KEY"),
        };

        let Some(key) = key.clone() else {
            tracing::warn!(key = name, "speech recognition disabled: API key not set");
            return Ok(None);
        };

        let stt = match self.voice.stt_provider {
            SttProviderKind::Whisper => SpeechToText::new_whisper(key, self.voice.stt_model.clone())?,
            SttProviderKind::Deepgram => SpeechToText::new_deepgram(key, self.voice.stt_model.clone())?,
        };
        Ok(Some(Arc::new(stt)))
    }

    /// Build the speech synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if a keyed provider is selected without its key
    pub fn synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        let voice = &self.voice;
        let tts = match voice.tts_provider {
            TtsProviderKind::Google => TextToSpeech::new_google(),
            TtsProviderKind::OpenAI => TextToSpeech::new_openai(
                self.api_keys.openai.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            )?,
            TtsProviderKind::ElevenLabs => TextToSpeech::new_elevenlabs(
                self.api_keys.elevenlabs.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_model.clone(),
            )?,
        };
        Ok(Arc::new(tts))
    }

    /// Assemble the full pipeline from configured backends
    ///
    /// # Errors
    ///
    /// Returns error if the language model or synthesizer cannot be built
    pub fn pipeline(&self) -> Result<Pipeline> {
        let generator =
            ResponseGenerator::new(self.language_model()?).with_window(self.llm.context_window);
        let mut pipeline = Pipeline::new(generator, self.synthesizer()?)
            .with_artifact_store(ArtifactStore::new(&self.artifact_dir));
        if let Some(transcriber) = self.transcriber()? {
            pipeline = pipeline.with_transcriber(transcriber);
        }
        Ok(pipeline)
    }
}
