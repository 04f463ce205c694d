//! Speech-to-text (STT) processing

use async_trait::async_trait;

use super::clip::AudioClip;
use crate::error::TranscriptionError;
use crate::language::Language;
use crate::{Error, Result};

/// Turns a clip into text in a single attempt
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `clip`, using `language` as a recognition hint
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptionError::Unintelligible`] when no speech was
    /// recognized and [`TranscriptionError::ServiceUnavailable`] on backend failure
    async fn transcribe(
        &self,
        clip: &AudioClip,
        language: Language,
    ) -> std::result::Result<String, TranscriptionError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcribes speech through a hosted recognition API
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Whisper,
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Deepgram,
        })
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(
        &self,
        audio: Vec<u8>,
        language: Language,
    ) -> std::result::Result<String, TranscriptionError> {
        tracing::debug!(audio_bytes = audio.len(), %language, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(unavailable)?,
            )
            .text("model", self.model.clone())
            .text("language", language.code());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                unavailable(e)
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(TranscriptionError::ServiceUnavailable(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            unavailable(e)
        })?;

        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(
        &self,
        audio: Vec<u8>,
        language: Language,
    ) -> std::result::Result<String, TranscriptionError> {
        tracing::debug!(audio_bytes = audio.len(), %language, "starting Deepgram transcription");

        let response = self
            .client
            .post("https://api.deepgram.com/v1/listen")
            .query(&[
                ("model", self.model.as_str()),
                ("punctuate", "true"),
                ("language", language.code()),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                unavailable(e)
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(TranscriptionError::ServiceUnavailable(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            unavailable(e)
        })?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        language: Language,
    ) -> std::result::Result<String, TranscriptionError> {
        let audio = clip.to_wav().map_err(unavailable)?;

        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, language).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, language).await?,
        };

        recognized(transcript)
    }

    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::Whisper => "whisper",
            SttProvider::Deepgram => "deepgram",
        }
    }
}

/// An empty transcript means the backend heard nothing it could resolve
fn recognized(transcript: String) -> std::result::Result<String, TranscriptionError> {
    let text = transcript.trim();
    if text.is_empty() {
        tracing::debug!("empty transcript");
        return Err(TranscriptionError::Unintelligible);
    }

    tracing::info!(transcript = %text, "transcription complete");
    Ok(text.to_string())
}

fn unavailable(e: impl std::fmt::Display) -> TranscriptionError {
    TranscriptionError::ServiceUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(SpeechToText::new_whisper(String::new(), "whisper-1".to_string()).is_err());
        assert!(SpeechToText::new_deepgram(String::new(), "nova-2".to_string()).is_err());
    }

    #[test]
    fn test_provider_names() {
        let stt = SpeechToText::new_deepgram("key".to_string(), "nova-2".to_string()).unwrap();
        assert_eq!(stt.name(), "deepgram");
    }

    #[test]
    fn test_blank_transcript_is_unintelligible() {
        assert_eq!(recognized("  \n".to_string()), Err(TranscriptionError::Unintelligible));
        assert_eq!(recognized(" hola ".to_string()).unwrap(), "hola");
    }
}
