//! # Recording Controller
//!
//! ## Responsibility
//! Owns one capture at a time: picks the upload format, collects encoded
//! chunks, watches incoming sample frames for sustained silence and decides
//! on stop whether the capture is submitted or discarded.
//!
//! ## Guarantees
//! - At most one silence deadline is outstanding; a loud frame cancels it.
//! - A capture with no chunks is dropped without a notice.
//! - A capture shorter than the minimum duration is dropped with a notice.
//! - Time is passed in by the caller, so the controller never sleeps.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::protocol::RecordedAudio;

/// Capture formats in order of preference.
pub const MIME_PREFERENCE: [&str; 6] = [
    "audio/webm;codecs=opus",
    "audio/mp4",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/wav",
    "audio/mp3",
];

pub const UPLOAD_FILE_NAME: &str = "audio.wav";
pub const TOO_SHORT_NOTICE: &str = "Recording too short, please record for at least 1 second";

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_MIN_DURATION: Duration = Duration::from_millis(1000);
/// Peak magnitude below which a normalized sample counts as silence.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.02;

/// First entry of [`MIME_PREFERENCE`] the platform accepts.
pub fn pick_mime_type(is_supported: impl Fn(&str) -> bool) -> Option<&'static str> {
    MIME_PREFERENCE.iter().copied().find(|m| is_supported(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    SilenceTimeout,
    Navigation,
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Nothing was captured.
    Empty,
    TooShort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Submit(RecordedAudio),
    Discarded(DiscardReason),
}

impl RecordingOutcome {
    /// Notice to show the user, if any.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            RecordingOutcome::Discarded(DiscardReason::TooShort) => Some(TOO_SHORT_NOTICE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingPolicy {
    pub silence_timeout: Duration,
    pub min_duration: Duration,
    pub silence_threshold: f32,
}

impl Default for RecordingPolicy {
    fn default() -> Self {
        Self {
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            min_duration: DEFAULT_MIN_DURATION,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Silence detection
// ---------------------------------------------------------------------------

/// Arms a single deadline on the first silent frame and clears it on the
/// first loud one.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(threshold: f32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            deadline: None,
        }
    }

    /// Every sample below the threshold in magnitude.
    pub fn is_silent(&self, samples: &[f32]) -> bool {
        samples.iter().all(|s| s.abs() < self.threshold)
    }

    pub fn on_frame(&mut self, samples: &[f32], now: Instant) {
        if self.is_silent(samples) {
            if self.deadline.is_none() {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "silence started");
                self.deadline = Some(now + self.timeout);
            }
        } else if self.deadline.take().is_some() {
            debug!("speech resumed");
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn elapsed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn reset(&mut self) {
        self.deadline = None;
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ActiveCapture {
    mime_type: &'static str,
    started_at: Instant,
    chunks: Vec<Vec<u8>>,
    silence: SilenceDetector,
}

#[derive(Debug, Default)]
pub struct RecordingController {
    policy: RecordingPolicy,
    active: Option<ActiveCapture>,
}

impl RecordingController {
    pub fn new(policy: RecordingPolicy) -> Self {
        Self {
            policy,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a capture. Returns the chosen MIME type.
    pub fn start(&mut self, is_supported: impl Fn(&str) -> bool, now: Instant) -> Result<&'static str> {
        if self.active.is_some() {
            return Err(ChatError::AlreadyRecording);
        }
        let mime_type = pick_mime_type(is_supported).ok_or(ChatError::UnsupportedFormat)?;
        info!(mime_type, "recording started");
        self.active = Some(ActiveCapture {
            mime_type,
            started_at: now,
            chunks: Vec::new(),
            silence: SilenceDetector::new(self.policy.silence_threshold, self.policy.silence_timeout),
        });
        Ok(mime_type)
    }

    /// Encoded data became available. Empty chunks are ignored.
    pub fn on_chunk(&mut self, bytes: &[u8]) {
        if let Some(capture) = self.active.as_mut() {
            if !bytes.is_empty() {
                capture.chunks.push(bytes.to_vec());
            }
        }
    }

    /// A frame of normalized samples for silence analysis.
    pub fn on_frame(&mut self, samples: &[f32], now: Instant) {
        if let Some(capture) = self.active.as_mut() {
            capture.silence.on_frame(samples, now);
        }
    }

    pub fn silence_deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|c| c.silence.deadline())
    }

    pub fn silence_elapsed(&self, now: Instant) -> bool {
        self.active.as_ref().is_some_and(|c| c.silence.elapsed(now))
    }

    /// Stop with [`StopReason::SilenceTimeout`] if the silence deadline has
    /// passed.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<RecordingOutcome> {
        if !self.silence_elapsed(now) {
            return None;
        }
        self.stop(StopReason::SilenceTimeout, now).ok()
    }

    pub fn stop(&mut self, reason: StopReason, now: Instant) -> Result<RecordingOutcome> {
        let capture = self.active.take().ok_or(ChatError::NotRecording)?;
        let duration = now.saturating_duration_since(capture.started_at);
        info!(?reason, duration_ms = duration.as_millis() as u64, chunks = capture.chunks.len(), "recording stopped");

        if capture.chunks.is_empty() {
            return Ok(RecordingOutcome::Discarded(DiscardReason::Empty));
        }
        if duration < self.policy.min_duration {
            return Ok(RecordingOutcome::Discarded(DiscardReason::TooShort));
        }
        Ok(RecordingOutcome::Submit(RecordedAudio {
            bytes: capture.chunks.concat(),
            mime_type: capture.mime_type.to_string(),
            file_name: UPLOAD_FILE_NAME.to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// WAV replay
// ---------------------------------------------------------------------------

const REPLAY_FRAME: Duration = Duration::from_millis(20);

/// Drive a fresh capture from a WAV file as if it were arriving live.
///
/// Frames are fed on a virtual clock, so silence auto-stop and the minimum
/// duration apply exactly as they would to a microphone. The audio consumed
/// up to the stop point is re-encoded as 16-bit WAV for upload.
pub fn replay_wav(path: &Path, policy: RecordingPolicy) -> Result<RecordingOutcome> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = read_normalized(&mut reader)?;

    let channels = usize::from(spec.channels.max(1));
    let frame_len = ((spec.sample_rate as u128 * REPLAY_FRAME.as_millis()) / 1000) as usize * channels;
    let frame_len = frame_len.max(channels);

    let mut controller = RecordingController::new(policy);
    let started = Instant::now();
    controller.start(|m| m == "audio/wav", started)?;

    let mut now = started;
    let mut consumed = 0;
    let mut reason = StopReason::EndOfInput;
    for frame in samples.chunks(frame_len) {
        now += REPLAY_FRAME;
        consumed += frame.len();
        controller.on_frame(frame, now);
        if controller.silence_elapsed(now) {
            reason = StopReason::SilenceTimeout;
            break;
        }
    }

    let encoded = encode_wav(&samples[..consumed], spec.channels, spec.sample_rate)?;
    controller.on_chunk(&encoded);
    controller.stop(reason, now)
}

fn read_normalized<R: std::io::Read>(reader: &mut hound::WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(samples)
}

fn encode_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
