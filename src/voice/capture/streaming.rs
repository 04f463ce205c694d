//! Continuous capture through a bounded frame queue
//!
//! A producer (the microphone callback, or any external transport) pushes
//! fixed-size frames into a bounded channel. The capture call drains it with a
//! timeout per attempt and an overall wait budget, so it always returns.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::{CaptureConfig, CaptureStrategy, default_input_device, mono_input_config};
use crate::error::CaptureError;
use crate::voice::clip::{AudioClip, CaptureSource};
use crate::voice::vad::{DEFAULT_ENERGY_THRESHOLD, UtteranceDetector};

/// Producer side of the frame queue
///
/// Never blocks: a frame that does not fit in the full queue is dropped.
#[derive(Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<Vec<f32>>,
    frame_size: usize,
    pending: Vec<f32>,
    dropped: u64,
}

impl FrameSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Vec<f32>>, frame_size: usize) -> Self {
        Self {
            tx,
            frame_size: frame_size.max(1),
            pending: Vec::with_capacity(frame_size),
            dropped: 0,
        }
    }

    /// Buffer raw samples, sending every complete frame
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            self.push_frame(frame);
        }
    }

    /// Send one frame as-is
    ///
    /// Returns false if the frame was dropped
    pub fn push_frame(&mut self, frame: Vec<f32>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::trace!(dropped = self.dropped, "frame queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Send any buffered partial frame
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            let frame = std::mem::take(&mut self.pending);
            self.push_frame(frame);
        }
    }

    /// Frames dropped because the queue was full
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// True once the draining side is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Something that delivers frames into a [`FrameSink`] in the background
pub trait FrameSource: Send {
    /// Begin delivering frames
    ///
    /// # Errors
    ///
    /// Returns error if the producer cannot be started
    fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Stop delivering frames and release the producer
    fn stop(&mut self);
}

/// Forwards one utterance from a live feed into a [`FrameSink`]
///
/// Audio before speech starts is held back. Once the speaker pauses (or the
/// phrase limit is hit) the partial frame is flushed and the sink is closed,
/// which ends the drain.
#[derive(Debug)]
pub struct SpeechGate {
    detector: UtteranceDetector,
    sink: Option<FrameSink>,
    forwarded: usize,
}

impl SpeechGate {
    #[must_use]
    pub const fn new(sink: FrameSink, detector: UtteranceDetector) -> Self {
        Self {
            detector,
            sink: Some(sink),
            forwarded: 0,
        }
    }

    /// Feed raw samples from the device
    pub fn push_samples(&mut self, samples: &[f32]) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        let complete = self.detector.process(samples);
        let speech = self.detector.speech_buffer();
        if speech.len() > self.forwarded {
            sink.push_samples(&speech[self.forwarded..]);
            self.forwarded = speech.len();
        } else if speech.is_empty() {
            // Detector discarded a blip
            self.forwarded = 0;
        }

        if complete {
            sink.flush();
            self.sink = None;
            tracing::debug!(samples = self.forwarded, "utterance ended, closing frame stream");
        }
    }

    /// True until the utterance has ended
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.sink.is_some()
    }
}

/// Streams the default microphone from a dedicated thread
///
/// cpal streams are not `Send`, so the stream lives and dies on its own thread.
///
/// Frames are gated by energy so only the spoken utterance is delivered.
#[derive(Debug)]
pub struct MicrophoneFrameSource {
    sample_rate: u32,
    phrase_limit: Duration,
    worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
}

impl MicrophoneFrameSource {
    #[must_use]
    pub const fn new(sample_rate: u32, phrase_limit: Duration) -> Self {
        Self {
            sample_rate,
            phrase_limit,
            worker: None,
        }
    }
}

impl FrameSource for MicrophoneFrameSource {
    fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        self.stop();

        let sample_rate = self.sample_rate;
        let gate = SpeechGate::new(
            sink,
            UtteranceDetector::new(sample_rate, DEFAULT_ENERGY_THRESHOLD, self.phrase_limit),
        );
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || {
                let stream = match open_stream(sample_rate, gate) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stopped or the owner is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("frame source stopped");
            })
            .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                tracing::debug!(sample_rate, "frame source started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::RecordingError("frame source thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                tracing::warn!("frame source thread panicked");
            }
        }
    }
}

impl Drop for MicrophoneFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(sample_rate: u32, mut gate: SpeechGate) -> Result<cpal::Stream, CaptureError> {
    let device = default_input_device()?;
    let config = mono_input_config(&device, sample_rate)?;

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                gate.push_samples(data);
            },
            |err| {
                tracing::error!(error = %err, "audio stream error");
            },
            None,
        )
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::RecordingError(e.to_string()))?;

    Ok(stream)
}

/// Drains a live frame stream into one clip
pub struct StreamingBufferCapture {
    // Taken while a blocking start or stop runs
    source: Option<Box<dyn FrameSource>>,
    stop: watch::Receiver<bool>,
}

impl StreamingBufferCapture {
    /// Create a capture over `source`; setting `stop` to true ends a drain early
    #[must_use]
    pub fn new(source: Box<dyn FrameSource>, stop: watch::Receiver<bool>) -> Self {
        Self {
            source: Some(source),
            stop,
        }
    }

    /// Capture over the default microphone
    #[must_use]
    pub fn microphone(config: &CaptureConfig, stop: watch::Receiver<bool>) -> Self {
        Self::new(
            Box::new(MicrophoneFrameSource::new(config.sample_rate, config.phrase_limit)),
            stop,
        )
    }

    /// Run blocking source work off the async runtime
    async fn on_source<T, F>(&mut self, work: F) -> Result<T, CaptureError>
    where
        F: FnOnce(&mut dyn FrameSource) -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| CaptureError::RecordingError("frame source unavailable".to_string()))?;

        let (source, out) = tokio::task::spawn_blocking(move || {
            let out = work(source.as_mut());
            (source, out)
        })
        .await
        .map_err(|e| CaptureError::RecordingError(format!("frame source task failed: {e}")))?;

        self.source = Some(source);
        Ok(out)
    }
}

#[async_trait]
impl CaptureStrategy for StreamingBufferCapture {
    async fn capture(&mut self, config: &CaptureConfig) -> Result<AudioClip, CaptureError> {
        let (tx, mut rx) = mpsc::channel(config.queue_capacity.max(1));
        let sink = FrameSink::new(tx, config.frame_size);
        self.on_source(move |source| source.start(sink)).await??;

        let drained = drain_frames(
            &mut rx,
            &self.stop,
            config.onset_timeout,
            config.drain_timeout,
            config.drain_budget,
        )
        .await;
        self.on_source(|source| source.stop()).await?;

        let samples = drained?;
        tracing::debug!(samples = samples.len(), "stream drained");
        Ok(AudioClip::new(samples, config.sample_rate, CaptureSource::Stream))
    }

    fn source(&self) -> CaptureSource {
        CaptureSource::Stream
    }
}

/// Pull frames until a gap, the stop flag, a closed queue, or the budget ends the drain
///
/// The first attempt waits up to `onset_timeout`; timing out before any frame
/// arrived means there is no audio at all.
async fn drain_frames(
    rx: &mut mpsc::Receiver<Vec<f32>>,
    stop: &watch::Receiver<bool>,
    onset_timeout: Duration,
    attempt_timeout: Duration,
    budget: Duration,
) -> Result<Vec<f32>, CaptureError> {
    let deadline = Instant::now() + budget;
    let mut samples = Vec::new();

    loop {
        if *stop.borrow() {
            tracing::debug!("capture stopped by caller");
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!("drain budget exhausted");
            break;
        }
        let attempt = if samples.is_empty() {
            onset_timeout
        } else {
            attempt_timeout
        };
        let wait = attempt.min(deadline - now);

        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(frame)) => samples.extend_from_slice(&frame),
            Ok(None) => {
                tracing::debug!("frame source closed");
                break;
            }
            Err(_) if samples.is_empty() => {
                tracing::debug!(timeout_ms = wait.as_millis(), "no frames before timeout");
                return Err(CaptureError::NoAudioDetected);
            }
            Err(_) => {
                tracing::debug!(samples = samples.len(), "gap in stream, keeping partial clip");
                break;
            }
        }
    }

    if samples.is_empty() {
        return Err(CaptureError::NoAudioDetected);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::vad::tests::{silence, sine};

    /// Pushes a fixed number of frames on start, optionally holding the sink open
    struct ScriptedSource {
        frames: usize,
        frame_len: usize,
        hold_open: bool,
        held: Option<FrameSink>,
    }

    impl ScriptedSource {
        fn new(frames: usize, hold_open: bool) -> Self {
            Self {
                frames,
                frame_len: 160,
                hold_open,
                held: None,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self, mut sink: FrameSink) -> Result<(), CaptureError> {
            for _ in 0..self.frames {
                sink.push_frame(vec![0.2; self.frame_len]);
            }
            if self.hold_open {
                self.held = Some(sink);
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.held = None;
        }
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            onset_timeout: Duration::from_millis(50),
            drain_timeout: Duration::from_millis(50),
            drain_budget: Duration::from_millis(500),
            ..CaptureConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_no_audio() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut capture = StreamingBufferCapture::new(Box::new(ScriptedSource::new(0, true)), stop_rx);

        let err = capture.capture(&fast_config()).await.unwrap_err();
        assert_eq!(err, CaptureError::NoAudioDetected);
    }

    #[tokio::test]
    async fn test_gap_keeps_partial_clip() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut capture = StreamingBufferCapture::new(Box::new(ScriptedSource::new(3, true)), stop_rx);

        let clip = capture.capture(&fast_config()).await.unwrap();
        assert_eq!(clip.samples().len(), 3 * 160);
        assert_eq!(clip.source(), CaptureSource::Stream);
    }

    #[tokio::test]
    async fn test_closed_source_ends_drain() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut capture = StreamingBufferCapture::new(Box::new(ScriptedSource::new(2, false)), stop_rx);

        let clip = capture.capture(&fast_config()).await.unwrap();
        assert_eq!(clip.samples().len(), 2 * 160);
    }

    #[tokio::test]
    async fn test_queue_is_bounded() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let config = CaptureConfig {
            queue_capacity: 2,
            ..fast_config()
        };
        let mut capture = StreamingBufferCapture::new(Box::new(ScriptedSource::new(5, false)), stop_rx);

        let clip = capture.capture(&config).await.unwrap();
        assert_eq!(clip.samples().len(), 2 * 160);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_capture() {
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        let mut capture = StreamingBufferCapture::new(Box::new(ScriptedSource::new(3, true)), stop_rx);

        let started = std::time::Instant::now();
        let err = capture.capture(&fast_config()).await.unwrap_err();
        assert_eq!(err, CaptureError::NoAudioDetected);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_budget_caps_drain() {
        let (tx, mut rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        // Producer keeps frames coming faster than the attempt timeout
        let producer = tokio::spawn(async move {
            while tx.send(vec![0.1; 16]).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let started = std::time::Instant::now();
        let samples = drain_frames(
            &mut rx,
            &stop_rx,
            Duration::from_millis(100),
            Duration::from_millis(100),
            Duration::from_millis(150),
        )
        .await
        .unwrap();
        drop(rx);
        producer.await.unwrap();

        assert!(!samples.is_empty());
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    /// Plays a scripted microphone feed through a [`SpeechGate`] on start
    struct GatedSource {
        feed: Vec<f32>,
    }

    impl FrameSource for GatedSource {
        fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
            let detector = UtteranceDetector::new(16000, DEFAULT_ENERGY_THRESHOLD, Duration::from_secs(30));
            let mut gate = SpeechGate::new(sink, detector);
            for chunk in self.feed.chunks(160) {
                gate.push_samples(chunk);
            }
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn gate_channel() -> (SpeechGate, mpsc::Receiver<Vec<f32>>) {
        let (tx, rx) = mpsc::channel(256);
        let detector = UtteranceDetector::new(16000, DEFAULT_ENERGY_THRESHOLD, Duration::from_secs(30));
        (SpeechGate::new(FrameSink::new(tx, 1600), detector), rx)
    }

    fn received(rx: &mut mpsc::Receiver<Vec<f32>>) -> usize {
        let mut total = 0;
        while let Ok(frame) = rx.try_recv() {
            total += frame.len();
        }
        total
    }

    #[test]
    fn test_gate_holds_back_leading_silence() {
        let (mut gate, mut rx) = gate_channel();

        gate.push_samples(&silence(1.0));
        assert_eq!(received(&mut rx), 0);
        assert!(gate.is_open());
    }

    #[test]
    fn test_gate_closes_after_pause() {
        let (mut gate, mut rx) = gate_channel();

        for chunk in silence(0.5).chunks(160) {
            gate.push_samples(chunk);
        }
        for chunk in sine(0.5, 0.3).chunks(160) {
            gate.push_samples(chunk);
        }
        assert!(gate.is_open());
        for chunk in silence(1.0).chunks(160) {
            gate.push_samples(chunk);
        }
        assert!(!gate.is_open());

        // Speech plus the pause that ended it, nothing from before
        let total = received(&mut rx);
        assert!(total >= 8000 + 12800, "received {total}");
        assert!(total < 8000 + 16000, "received {total}");
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_pause_ends_capture_before_budget() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let mut feed = silence(0.3);
        feed.extend(sine(0.5, 0.3));
        feed.extend(silence(1.0));
        let mut capture = StreamingBufferCapture::new(Box::new(GatedSource { feed }), stop_rx);
        let config = CaptureConfig {
            drain_timeout: Duration::from_secs(5),
            drain_budget: Duration::from_secs(15),
            ..CaptureConfig::default()
        };

        let started = std::time::Instant::now();
        let clip = capture.capture(&config).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(clip.samples().len() >= 8000);
        assert!(clip.duration() < Duration::from_secs(2));
    }

    #[test]
    fn test_sink_flushes_partial_frame() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = FrameSink::new(tx, 1000);

        sink.push_samples(&[0.0; 300]);
        assert!(rx.try_recv().is_err());
        sink.flush();
        assert_eq!(rx.try_recv().unwrap().len(), 300);
    }

    #[test]
    fn test_sink_chunks_into_frames() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = FrameSink::new(tx, 1000);

        sink.push_samples(&[0.0; 2500]);
        assert_eq!(rx.try_recv().unwrap().len(), 1000);
        assert_eq!(rx.try_recv().unwrap().len(), 1000);
        assert!(rx.try_recv().is_err());

        sink.push_samples(&[0.0; 500]);
        assert_eq!(rx.try_recv().unwrap().len(), 1000);
    }

    #[test]
    fn test_sink_counts_dropped_frames() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = FrameSink::new(tx, 4);

        assert!(sink.push_frame(vec![0.0; 4]));
        assert!(!sink.push_frame(vec![0.0; 4]));
        assert_eq!(sink.dropped(), 1);
    }
}
