//! TOML configuration file loading
//!
//! Supports `config.toml` in the platform config directory (or the path in
//! `POLYGLOT_CONFIG`) as a persistent config source. All fields are optional;
//! the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech recognition and synthesis
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Microphone capture tunables
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Where synthesized replies are written
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Gemini model (e.g. "gemini-2.0-flash")
    pub model: Option<String>,

    /// Prior turns sent with each prompt
    pub context_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,

    pub stt_model: Option<String>,

    /// "google", "openai" or "elevenlabs"
    pub tts_provider: Option<String>,

    /// Voice name (`OpenAI`) or voice ID (`ElevenLabs`)
    pub tts_voice: Option<String>,

    pub tts_model: Option<String>,

    /// Speed multiplier for `OpenAI` TTS (0.25 to 4.0)
    pub tts_speed: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub calibration_secs: Option<f64>,
    pub listen_timeout_secs: Option<f64>,
    pub phrase_limit_secs: Option<f64>,
    pub record_secs: Option<f64>,
    pub onset_timeout_secs: Option<f64>,
    pub drain_budget_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub google: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
}

/// Load the config file, falling back to defaults when absent or invalid
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> ConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Default location, e.g. `~/.config/polyglot-voice/config.toml` on Linux
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    super::project_dirs().map(|d| d.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let fc: ConfigFile = toml::from_str(
            r#"
            artifact_dir = "/tmp/replies"

            [llm]
            context_window = 4

            [voice]
            tts_provider = "openai"
            "#,
        )
        .unwrap();

        assert_eq!(fc.llm.context_window, Some(4));
        assert_eq!(fc.voice.tts_provider.as_deref(), Some("openai"));
        assert!(fc.api_keys.google.is_none());
        assert_eq!(fc.artifact_dir, Some(PathBuf::from("/tmp/replies")));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "llm = [").unwrap();

        let fc = load_config_file(Some(&path));
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(fc.server.port.is_none());
    }
}
