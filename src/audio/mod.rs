//! Audio plumbing for the monitor.
//!
//! Capture arrives either through backend callbacks (push) or blocking reads
//! (pull) and is cut into fixed-length [`AudioFrame`] blocks that travel
//! through the [`CaptureQueue`] to the decision thread. The render side is a
//! [`RenderSink`] the playback session writes into.

use std::time::Duration;

/// Frames per [`AudioFrame`] block unless configured otherwise.
pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Format used for render when the trigger asset has no readable header.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

mod asset;
mod backend;
mod cpal_backend;
mod dispatch;
mod meter;
mod pacer;
mod queue;
#[cfg(test)]
mod tests;
mod wav;

pub use asset::TriggerAsset;
pub use backend::{
    AudioBackend, CaptureHandle, DeviceRole, FrameSource, ReadOutcome, RenderHandle, RenderSink,
    SourceClock, SplitBackend, StreamGuard,
};
pub use cpal_backend::CpalBackend;
pub use meter::{LoudnessMeter, SILENCE_FLOOR_LUFS};
pub use queue::{Batch, CaptureQueue, PushOutcome, DEFAULT_QUEUE_CAPACITY};
pub(crate) use pacer::ReplayPacer;
pub use wav::{NullRender, WavBackend, WavRender, WavSource};
pub(crate) use wav::SampleStream;

/// Sample rate and channel layout negotiated once per pipeline.
///
/// Samples are always interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }

    /// Number of PCM frames (one sample per channel) covering `duration`.
    pub fn frames_for(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * f64::from(self.sample_rate)).ceil() as u64
    }

    pub fn duration_of(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono(FALLBACK_SAMPLE_RATE)
    }
}

/// Fixed-length block of interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            samples,
            channels: channels.max(1),
        }
    }

    /// A block of `frames` silent PCM frames.
    pub fn silence(frames: usize, channels: u16) -> Self {
        let channels = channels.max(1);
        Self::new(vec![0.0; frames * usize::from(channels)], channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// PCM frames in this block (samples divided by channel count).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
