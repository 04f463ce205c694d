//! Captured audio clips and WAV conversion

use std::io::Cursor;
use std::time::Duration;

use serde::Serialize;

use crate::{Error, Result};

/// Sample rate the pipeline hands to speech recognition (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Sample rates accepted from decoded WAV files
pub const WAV_SAMPLE_RATES: std::ops::RangeInclusive<u32> = 8_000..=192_000;

/// Where a clip came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Blocking, silence-terminated microphone listen
    Microphone,
    /// Frames drained from a live stream
    Stream,
    /// Fixed-length recording or pre-recorded file
    File,
}

/// Mono audio samples in `[-1.0, 1.0]` plus their rate and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    source: CaptureSource,
}

impl AudioClip {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32, source: CaptureSource) -> Self {
        Self {
            samples,
            sample_rate,
            source,
        }
    }

    /// Decode a WAV file, mixing multi-channel audio down to mono
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a readable WAV file or declare a
    /// sample rate outside [`WAV_SAMPLE_RATES`]
    pub fn from_wav(bytes: &[u8], source: CaptureSource) -> Result<Self> {
        let mut reader =
            hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
        let spec = reader.spec();
        if !WAV_SAMPLE_RATES.contains(&spec.sample_rate) {
            return Err(Error::Audio(format!(
                "unsupported sample rate {} Hz",
                spec.sample_rate
            )));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?,
            hound::SampleFormat::Int => {
                #[allow(clippy::cast_precision_loss)]
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                #[allow(clippy::cast_precision_loss)]
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::Audio(e.to_string()))?
            }
        };

        let samples = downmix(&interleaved, spec.channels);
        Ok(Self::new(samples, spec.sample_rate, source))
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn source(&self) -> CaptureSource {
        self.source
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Resample to `target_rate`, returning the clip unchanged if it already matches
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be built
    pub fn resampled(self, target_rate: u32) -> Result<Self> {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(self);
        }

        let samples = resample_audio(&self.samples, self.sample_rate, target_rate)?;
        tracing::debug!(
            from = self.sample_rate,
            to = target_rate,
            samples = samples.len(),
            "clip resampled"
        );
        Ok(Self::new(samples, target_rate, self.source))
    }

    /// Encode as 16-bit PCM WAV for recognition APIs
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(usize::from(channels))
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio using rubato
///
/// The final partial chunk is zero-padded and the output trimmed back to the
/// expected length.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        let mut block = chunk.to_vec();
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    output.truncate(expected);

    Ok(output.iter().map(|&s| s as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header() {
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5], SAMPLE_RATE, CaptureSource::File);
        let wav = clip.to_wav().unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_from_wav_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..10 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let clip = AudioClip::from_wav(&cursor.into_inner(), CaptureSource::File).unwrap();
        assert_eq!(clip.sample_rate(), 8000);
        assert_eq!(clip.samples().len(), 10);
        assert!((clip.samples()[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_from_wav_rejects_bogus_rate() {
        for rate in [1, 7, 4_000, 384_000] {
            let wav = samples_to_wav(&[0.1; 100], rate).unwrap();
            let err = AudioClip::from_wav(&wav, CaptureSource::File).unwrap_err();
            assert!(err.to_string().contains("sample rate"), "rate {rate}: {err}");
        }
    }

    #[test]
    fn test_from_wav_rejects_garbage() {
        assert!(AudioClip::from_wav(b"not a wav", CaptureSource::File).is_err());
    }

    #[test]
    fn test_resample_length() {
        let clip = AudioClip::new(vec![0.1; 44100], 44100, CaptureSource::File);
        let resampled = clip.resampled(SAMPLE_RATE).unwrap();
        assert_eq!(resampled.sample_rate(), SAMPLE_RATE);
        let len = resampled.samples().len();
        assert!(len <= 16000 && len > 15000, "unexpected length {len}");
    }

    #[test]
    fn test_duration() {
        let clip = AudioClip::new(vec![0.0; 8000], SAMPLE_RATE, CaptureSource::Stream);
        assert_eq!(clip.duration(), Duration::from_millis(500));
    }
}
