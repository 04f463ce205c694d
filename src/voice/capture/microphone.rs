//! Blocking, silence-terminated microphone capture

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::Stream;
use cpal::traits::{DeviceTrait, StreamTrait};

use super::{CaptureConfig, CaptureStrategy, default_input_device, mono_input_config, run_blocking};
use crate::error::CaptureError;
use crate::voice::clip::{AudioClip, CaptureSource};
use crate::voice::vad::{UtteranceDetector, calculate_energy};

/// How long one wait on the device channel lasts
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Calibrates against ambient noise, then listens until the speaker pauses
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingMicrophoneCapture;

impl BlockingMicrophoneCapture {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureStrategy for BlockingMicrophoneCapture {
    async fn capture(&mut self, config: &CaptureConfig) -> Result<AudioClip, CaptureError> {
        let config = config.clone();
        run_blocking(move || listen(&config)).await
    }

    fn source(&self) -> CaptureSource {
        CaptureSource::Microphone
    }
}

/// Ambient level reported by [`measure_ambient`]
#[derive(Debug, Clone, Copy)]
pub struct AmbientLevel {
    /// RMS energy of the ambient audio
    pub energy: f32,
    /// Speech threshold derived from it
    pub threshold: f32,
}

/// Sample the microphone for `config.calibration` and report the noise floor
///
/// # Errors
///
/// Returns error if the input device cannot be opened
pub async fn measure_ambient(config: &CaptureConfig) -> Result<AmbientLevel, CaptureError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let (_stream, chunks) = open_chunk_stream(config.sample_rate)?;
        let ambient = collect_for(&chunks, config.calibration)?;
        Ok(AmbientLevel {
            energy: calculate_energy(&ambient),
            threshold: UtteranceDetector::calibrate(&ambient),
        })
    })
    .await
    .map_err(|e| CaptureError::RecordingError(format!("calibration task failed: {e}")))?
}

fn listen(config: &CaptureConfig) -> Result<AudioClip, CaptureError> {
    let (stream, chunks) = open_chunk_stream(config.sample_rate)?;

    tracing::info!(seconds = config.calibration.as_secs_f32(), "adjusting for background noise");
    let ambient = collect_for(&chunks, config.calibration)?;
    let threshold = UtteranceDetector::calibrate(&ambient);

    tracing::info!("ready, listening for speech");
    let samples = listen_on(&chunks, threshold, config)?;
    drop(stream);
    tracing::debug!(samples = samples.len(), "utterance captured");

    Ok(AudioClip::new(samples, config.sample_rate, CaptureSource::Microphone))
}

/// Wait on `chunks` for one utterance louder than `threshold`
///
/// Fails with `ListenTimeout` if speech has not started by `config.listen_timeout`.
fn listen_on(
    chunks: &Receiver<Vec<f32>>,
    threshold: f32,
    config: &CaptureConfig,
) -> Result<Vec<f32>, CaptureError> {
    let mut detector = UtteranceDetector::new(config.sample_rate, threshold, config.phrase_limit);
    let deadline = Instant::now() + config.listen_timeout;

    loop {
        match chunks.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => {
                if detector.process(&chunk) {
                    return Ok(detector.take_speech_buffer());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CaptureError::RecordingError("input stream closed".to_string()));
            }
        }

        if detector.speech_buffer().is_empty() && Instant::now() >= deadline {
            tracing::debug!("no speech before listen timeout");
            return Err(CaptureError::ListenTimeout);
        }
    }
}

/// Start the default input device, delivering each callback's samples over a channel
fn open_chunk_stream(sample_rate: u32) -> Result<(Stream, Receiver<Vec<f32>>), CaptureError> {
    let device = default_input_device()?;
    let config = mono_input_config(&device, sample_rate)?;
    let (tx, rx) = mpsc::channel();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Receiver gone means the listen already finished
                let _ = tx.send(data.to_vec());
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    Ok((stream, rx))
}

/// Gather samples from `chunks` for `duration`
fn collect_for(chunks: &Receiver<Vec<f32>>, duration: Duration) -> Result<Vec<f32>, CaptureError> {
    let deadline = Instant::now() + duration;
    let mut samples = Vec::new();

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => samples.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CaptureError::RecordingError("input stream closed".to_string()));
            }
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::vad::DEFAULT_ENERGY_THRESHOLD;
    use crate::voice::vad::tests::{silence, sine};

    fn quick_config() -> CaptureConfig {
        CaptureConfig {
            listen_timeout: Duration::from_millis(200),
            ..CaptureConfig::default()
        }
    }

    fn send_chunks(tx: &mpsc::Sender<Vec<f32>>, samples: &[f32]) {
        for chunk in samples.chunks(1600) {
            tx.send(chunk.to_vec()).unwrap();
        }
    }

    #[test]
    fn test_silence_times_out() {
        let (tx, rx) = mpsc::channel();
        send_chunks(&tx, &silence(1.0));

        let started = Instant::now();
        let err = listen_on(&rx, DEFAULT_ENERGY_THRESHOLD, &quick_config()).unwrap_err();

        assert_eq!(err, CaptureError::ListenTimeout);
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(tx);
    }

    #[test]
    fn test_pause_ends_utterance() {
        let (tx, rx) = mpsc::channel();
        send_chunks(&tx, &silence(0.3));
        send_chunks(&tx, &sine(0.5, 0.3));
        send_chunks(&tx, &silence(1.0));

        let samples = listen_on(&rx, DEFAULT_ENERGY_THRESHOLD, &quick_config()).unwrap();

        // Leading silence is not part of the utterance
        assert!(samples.len() >= 8000);
        assert!(samples.len() < 8000 + 16000);
        drop(tx);
    }

    #[test]
    fn test_closed_device_is_recording_error() {
        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        drop(tx);

        let err = listen_on(&rx, DEFAULT_ENERGY_THRESHOLD, &quick_config()).unwrap_err();
        assert!(matches!(err, CaptureError::RecordingError(_)));
    }
}
