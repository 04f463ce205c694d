//! Synthesized reply audio and its on-disk storage

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::language::Language;

/// Encoding of synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III
    Mp3,
}

impl AudioFormat {
    /// MIME type for HTTP responses
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
        }
    }

    /// File extension without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
        }
    }
}

/// Playable audio for one assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisArtifact {
    audio: Vec<u8>,
    format: AudioFormat,
    language: Language,
}

impl SynthesisArtifact {
    #[must_use]
    pub const fn new(audio: Vec<u8>, format: AudioFormat, language: Language) -> Self {
        Self {
            audio,
            format,
            language,
        }
    }

    #[must_use]
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Download name offered to clients
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("response.{}", self.format.extension())
    }
}

/// Writes artifacts under `{root}/{session}/{interaction}.{ext}`
///
/// Keying by session and interaction keeps concurrent sessions from
/// overwriting each other's audio.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact would be stored at
    #[must_use]
    pub fn path_for(&self, session_id: Uuid, interaction_id: Uuid, format: AudioFormat) -> PathBuf {
        self.root
            .join(session_id.to_string())
            .join(format!("{interaction_id}.{}", format.extension()))
    }

    /// Persist an artifact, creating the session directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub async fn save(
        &self,
        session_id: Uuid,
        interaction_id: Uuid,
        artifact: &SynthesisArtifact,
    ) -> std::io::Result<PathBuf> {
        let path = self.path_for(session_id, interaction_id, artifact.format());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, artifact.audio()).await?;

        tracing::debug!(path = %path.display(), bytes = artifact.audio().len(), "artifact saved");
        Ok(path)
    }

    /// Remove every artifact stored for a session
    ///
    /// # Errors
    ///
    /// Returns error if the directory exists but cannot be removed
    pub async fn remove_session(&self, session_id: Uuid) -> std::io::Result<()> {
        let dir = self.root.join(session_id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> SynthesisArtifact {
        SynthesisArtifact::new(vec![0xFF, 0xFB, 0x90], AudioFormat::Mp3, Language::Es)
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(AudioFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(artifact().file_name(), "response.mp3");
    }

    #[tokio::test]
    async fn test_save_is_keyed_by_session_and_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let session = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let a = store.save(session, first, &artifact()).await.unwrap();
        let b = store.save(session, second, &artifact()).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(a, dir.path().join(session.to_string()).join(format!("{first}.mp3")));
        assert_eq!(std::fs::read(&b).unwrap(), artifact().audio());
    }

    #[tokio::test]
    async fn test_remove_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let session = Uuid::new_v4();

        let path = store.save(session, Uuid::new_v4(), &artifact()).await.unwrap();
        store.remove_session(session).await.unwrap();
        assert!(!path.exists());

        // Removing twice is fine
        store.remove_session(session).await.unwrap();
    }
}
