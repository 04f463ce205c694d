//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::artifact::{AudioFormat, SynthesisArtifact};
use crate::error::SynthesisError;
use crate::language::Language;
use crate::{Error, Result};

/// Longest text segment Google Translate TTS accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// Turns reply text into playable audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` spoken in `language`
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError`] if the backend fails or the text is empty
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
    ) -> std::result::Result<SynthesisArtifact, SynthesisError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    GoogleTranslate,
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech from text through a hosted API
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance using Google Translate's speech endpoint
    ///
    /// Needs no key and speaks every supported language.
    #[must_use]
    pub fn new_google() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: String::new(),
            voice: String::new(),
            speed: 1.0,
            model: String::new(),
            provider: TtsProvider::GoogleTranslate,
        }
    }

    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f32, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create a new TTS instance using ElevenLabs with a multilingual model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Synthesize using Google Translate TTS, one request per segment
    async fn synthesize_google(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        let segments = split_for_google(text, GOOGLE_MAX_CHARS);
        let total = segments.len().to_string();
        let mut audio = Vec::new();

        for (idx, segment) in segments.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = segment.chars().count().to_string();

            let response = self
                .client
                .get("https://translate.google.com/translate_tts")
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language.tts_code()),
                    ("q", segment.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Synthesis(SynthesisError::BackendFailure(format!(
                    "Google TTS error {status}: {body}"
                ))));
            }

            // MP3 frames concatenate into a valid stream
            audio.extend_from_slice(&response.bytes().await?);
        }

        Ok(audio)
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(SynthesisError::BackendFailure(format!(
                "OpenAI TTS error {status}: {body}"
            ))));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            language_code: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            language_code: language.code(),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(SynthesisError::BackendFailure(format!(
                "ElevenLabs TTS error {status}: {body}"
            ))));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
    ) -> std::result::Result<SynthesisArtifact, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::BackendFailure("no text to speak".to_string()));
        }

        tracing::debug!(provider = self.name(), %language, chars = text.len(), "synthesizing");
        let audio = match self.provider {
            TtsProvider::GoogleTranslate => self.synthesize_google(text, language).await,
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text, language).await,
        }
        .map_err(|e| match e {
            Error::Synthesis(inner) => inner,
            other => SynthesisError::BackendFailure(other.to_string()),
        })?;

        if audio.is_empty() {
            return Err(SynthesisError::BackendFailure("backend returned no audio".to_string()));
        }

        tracing::info!(bytes = audio.len(), "speech synthesized");
        Ok(SynthesisArtifact::new(audio, AudioFormat::Mp3, language))
    }

    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::GoogleTranslate => "google",
            TtsProvider::OpenAI => "openai",
            TtsProvider::ElevenLabs => "elevenlabs",
        }
    }
}

/// Split text into segments of at most `max_chars` characters
///
/// Breaks on whitespace where possible. Text without spaces (e.g. Chinese) is
/// cut at the character limit.
fn split_for_google(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                segments.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_segment() {
        assert_eq!(split_for_google("Hello there", 100), ["Hello there"]);
    }

    #[test]
    fn test_split_on_word_boundaries() {
        let text = "one two three four five";
        let segments = split_for_google(text, 9);
        assert_eq!(segments, ["one two", "three", "four five"]);
        assert!(segments.iter().all(|s| s.chars().count() <= 9));
    }

    #[test]
    fn test_split_without_spaces() {
        let text = "你好世界你好世界";
        let segments = split_for_google(text, 3);
        assert_eq!(segments, ["你好世", "界你好", "世界"]);
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(split_for_google("   ", 100).is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_is_synthesis_error() {
        let tts = TextToSpeech::new_google();
        let err = tts.synthesize("  ", Language::En).await.unwrap_err();
        assert!(matches!(err, SynthesisError::BackendFailure(_)));
    }

    #[test]
    fn test_keyed_providers_need_keys() {
        assert!(TextToSpeech::new_openai(String::new(), "alloy".into(), 1.0, "tts-1".into()).is_err());
        assert!(
            TextToSpeech::new_elevenlabs(String::new(), "voice".into(), "eleven_multilingual_v2".into())
                .is_err()
        );
    }
}
