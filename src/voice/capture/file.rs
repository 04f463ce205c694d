//! Fixed-duration recording to a WAV file, or a pre-recorded WAV

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};

use super::{CaptureConfig, CaptureStrategy, default_input_device, mono_input_config, run_blocking};
use crate::error::CaptureError;
use crate::voice::clip::{AudioClip, CaptureSource, samples_to_wav};

/// Extra wait past the recording length before giving up on the device
const RECORD_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
enum FileInput {
    /// Record from the microphone, keeping a copy at this path
    Record(PathBuf),
    /// Read an existing recording
    Existing(PathBuf),
}

/// Records a fixed-length sample, or loads one from disk
#[derive(Debug, Clone)]
pub struct FileBasedCapture {
    input: FileInput,
}

impl FileBasedCapture {
    /// Record `config.record_duration` from the microphone and save it to `path`
    #[must_use]
    pub fn recording_to(path: impl Into<PathBuf>) -> Self {
        Self {
            input: FileInput::Record(path.into()),
        }
    }

    /// Use the WAV file at `path` as the captured clip
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            input: FileInput::Existing(path.into()),
        }
    }
}

#[async_trait]
impl CaptureStrategy for FileBasedCapture {
    async fn capture(&mut self, config: &CaptureConfig) -> Result<AudioClip, CaptureError> {
        let clip = match &self.input {
            FileInput::Record(path) => {
                let path = path.clone();
                let record_config = config.clone();
                run_blocking(move || record(&record_config, &path)).await?
            }
            FileInput::Existing(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    CaptureError::RecordingError(format!("{}: {e}", path.display()))
                })?;
                AudioClip::from_wav(&bytes, CaptureSource::File)
                    .map_err(|e| CaptureError::RecordingError(e.to_string()))?
            }
        };

        if clip.is_empty() {
            return Err(CaptureError::NoAudioDetected);
        }

        clip.resampled(config.sample_rate)
            .map_err(|e| CaptureError::RecordingError(e.to_string()))
    }

    fn source(&self) -> CaptureSource {
        CaptureSource::File
    }
}

/// Record-and-wait: fill a buffer of exactly the requested length, then write it out
fn record(config: &CaptureConfig, path: &Path) -> Result<AudioClip, CaptureError> {
    let device = default_input_device()?;

    // Prefer the recording rate, fall back to the pipeline rate
    let (stream_config, sample_rate) = match mono_input_config(&device, config.record_sample_rate) {
        Ok(c) => (c, config.record_sample_rate),
        Err(_) => (
            mono_input_config(&device, config.sample_rate)?,
            config.sample_rate,
        ),
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target = (config.record_duration.as_secs_f64() * f64::from(sample_rate)) as usize;
    let buffer = Arc::new(Mutex::new(Vec::with_capacity(target)));
    let (done_tx, done_rx) = std_mpsc::sync_channel::<()>(1);

    let callback_buffer = Arc::clone(&buffer);
    let mut signalled = false;
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = callback_buffer.lock() {
                    let room = target.saturating_sub(buf.len());
                    buf.extend_from_slice(&data[..room.min(data.len())]);
                    if buf.len() >= target && !signalled {
                        signalled = true;
                        let _ = done_tx.try_send(());
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio recording error");
            },
            None,
        )
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    tracing::info!(seconds = config.record_duration.as_secs_f32(), "recording");
    stream
        .play()
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    let finished = done_rx.recv_timeout(config.record_duration + RECORD_GRACE);
    drop(stream);
    if finished.is_err() {
        return Err(CaptureError::RecordingError(
            "recording did not complete in time".to_string(),
        ));
    }

    let samples = buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .map_err(|_| CaptureError::RecordingError("recording buffer poisoned".to_string()))?;

    let wav = samples_to_wav(&samples, sample_rate)
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;
    std::fs::write(path, wav)
        .map_err(|e| CaptureError::RecordingError(format!("{}: {e}", path.display())))?;

    tracing::debug!(path = %path.display(), samples = samples.len(), "recording saved");
    Ok(AudioClip::new(samples, sample_rate, CaptureSource::File))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::clip::SAMPLE_RATE;

    fn write_wav(dir: &Path, name: &str, samples: &[f32], rate: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, samples_to_wav(samples, rate).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_existing_file_at_pipeline_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "input.wav", &[0.25; 1600], SAMPLE_RATE);

        let mut capture = FileBasedCapture::from_file(&path);
        let clip = capture.capture(&CaptureConfig::default()).await.unwrap();

        assert_eq!(clip.source(), CaptureSource::File);
        assert_eq!(clip.sample_rate(), SAMPLE_RATE);
        assert_eq!(clip.samples().len(), 1600);
    }

    #[tokio::test]
    async fn test_existing_file_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "input.wav", &[0.1; 44100], 44100);

        let mut capture = FileBasedCapture::from_file(&path);
        let clip = capture.capture(&CaptureConfig::default()).await.unwrap();

        assert_eq!(clip.sample_rate(), SAMPLE_RATE);
    }

    #[tokio::test]
    async fn test_missing_file_is_recording_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture = FileBasedCapture::from_file(dir.path().join("missing.wav"));

        let err = capture.capture(&CaptureConfig::default()).await.unwrap_err();
        assert!(matches!(err, CaptureError::RecordingError(_)));
    }

    #[tokio::test]
    async fn test_empty_file_is_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "empty.wav", &[], SAMPLE_RATE);

        let mut capture = FileBasedCapture::from_file(&path);
        let err = capture.capture(&CaptureConfig::default()).await.unwrap_err();
        assert_eq!(err, CaptureError::NoAudioDetected);
    }
}
