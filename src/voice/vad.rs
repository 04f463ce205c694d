//! Energy-based utterance detection
//!
//! Calibrates a threshold from ambient noise, then accumulates audio from the
//! first loud chunk until speech is followed by a long enough pause.

use std::time::Duration;

/// Threshold used before any calibration has run
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Lowest threshold calibration may settle on
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Speech must be this much louder than the ambient level
const AMBIENT_RATIO: f32 = 1.5;

/// Minimum speech before a pause may end the utterance
const MIN_SPEECH: Duration = Duration::from_millis(300);

/// Pause that ends an utterance
const PAUSE: Duration = Duration::from_millis(800);

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech to start
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Speech followed by a pause, or the phrase limit was hit
    Complete,
}

/// Detects one spoken utterance in a stream of chunks
#[derive(Debug)]
pub struct UtteranceDetector {
    threshold: f32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    min_speech_samples: usize,
    pause_samples: usize,
    max_samples: usize,
}

impl UtteranceDetector {
    /// Create a detector for audio at `sample_rate`, capping utterances at `phrase_limit`
    #[must_use]
    pub fn new(sample_rate: u32, threshold: f32, phrase_limit: Duration) -> Self {
        tracing::debug!(threshold, sample_rate, "utterance detector initialized");

        Self {
            threshold,
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            min_speech_samples: samples_for(MIN_SPEECH, sample_rate),
            pause_samples: samples_for(PAUSE, sample_rate),
            max_samples: samples_for(phrase_limit, sample_rate),
        }
    }

    /// Derive a speech threshold from a stretch of ambient audio
    #[must_use]
    pub fn calibrate(ambient: &[f32]) -> f32 {
        let ambient_energy = calculate_energy(ambient);
        let threshold = (ambient_energy * AMBIENT_RATIO).max(MIN_ENERGY_THRESHOLD);
        tracing::debug!(ambient_energy, threshold, "ambient noise calibrated");
        threshold
    }

    /// Feed a chunk of samples
    ///
    /// Returns true once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let spoken = self.speech_buffer.len().saturating_sub(self.silence_counter);
                if self.silence_counter > self.pause_samples && spoken > self.min_speech_samples {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    self.state = DetectorState::Complete;
                } else if self.silence_counter > self.pause_samples {
                    // A short blip followed by silence is noise, not speech
                    tracing::trace!("blip discarded");
                    self.reset();
                } else if self.speech_buffer.len() >= self.max_samples {
                    tracing::debug!(samples = self.speech_buffer.len(), "phrase limit reached");
                    self.state = DetectorState::Complete;
                }
            }
            DetectorState::Complete => {}
        }

        self.state == DetectorState::Complete
    }

    /// Take the accumulated utterance, resetting to waiting
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Reset detector to waiting
    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)) as usize
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
