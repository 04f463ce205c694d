//! Audio capture strategies
//!
//! Three interchangeable ways to get a clip from the user, all behind
//! [`CaptureStrategy`]. Which one runs is decided by the caller.

mod file;
mod microphone;
mod streaming;

pub use file::FileBasedCapture;
pub use microphone::{AmbientLevel, BlockingMicrophoneCapture, measure_ambient};
pub use streaming::{
    FrameSink, FrameSource, MicrophoneFrameSource, SpeechGate, StreamingBufferCapture,
};

use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::clip::{AudioClip, CaptureSource, SAMPLE_RATE};
use crate::error::CaptureError;

/// Tunables shared by every capture strategy
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate clips are delivered at
    pub sample_rate: u32,

    /// Ambient-noise calibration before a blocking listen
    pub calibration: Duration,

    /// How long a blocking listen waits for speech to start
    pub listen_timeout: Duration,

    /// Longest utterance a blocking listen will accept
    pub phrase_limit: Duration,

    /// Length of a fixed-duration recording
    pub record_duration: Duration,

    /// Device rate for fixed-duration recordings
    pub record_sample_rate: u32,

    /// Samples per streamed frame (100ms at 16kHz)
    pub frame_size: usize,

    /// Frames the stream queue holds before dropping new ones
    pub queue_capacity: usize,

    /// Wait for the first streamed frame before declaring no audio
    pub onset_timeout: Duration,

    /// Wait per drain attempt before declaring a gap
    pub drain_timeout: Duration,

    /// Total time a drain may take
    pub drain_budget: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            calibration: Duration::from_secs(2),
            listen_timeout: Duration::from_secs(10),
            phrase_limit: Duration::from_secs(30),
            record_duration: Duration::from_secs(5),
            record_sample_rate: 44100,
            frame_size: 1600,
            queue_capacity: 64,
            onset_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(1),
            drain_budget: Duration::from_secs(15),
        }
    }
}

/// A way of obtaining one clip of user audio
#[async_trait]
pub trait CaptureStrategy: Send {
    /// Capture a single clip
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] when no usable audio was obtained
    async fn capture(&mut self, config: &CaptureConfig) -> Result<AudioClip, CaptureError>;

    /// Provenance tag stamped on produced clips
    fn source(&self) -> CaptureSource;
}

/// Open the default input device
fn default_input_device() -> Result<Device, CaptureError> {
    cpal::default_host()
        .default_input_device()
        .ok_or(CaptureError::NoDeviceAvailable)
}

/// Find a mono input config at `sample_rate` on `device`
fn mono_input_config(device: &Device, sample_rate: u32) -> Result<StreamConfig, CaptureError> {
    let supported_config = device
        .supported_input_configs()
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| {
            CaptureError::RecordingError(format!("no mono input config at {sample_rate} Hz"))
        })?;

    let config = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio input configured"
    );

    Ok(config)
}

/// Run blocking device work off the async runtime
async fn run_blocking<F>(work: F) -> Result<AudioClip, CaptureError>
where
    F: FnOnce() -> Result<AudioClip, CaptureError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CaptureError::RecordingError(format!("capture task failed: {e}")))?
}
