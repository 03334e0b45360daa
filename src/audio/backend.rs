//! Capability boundary over the host audio subsystem.
//!
//! The pipeline only ever talks to these traits; `cpal` and WAV files are
//! adapters behind them.

use super::{AudioFormat, AudioFrame, CaptureQueue};
use crate::MonitorError;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Capture,
    Render,
}

impl DeviceRole {
    pub fn label(self) -> &'static str {
        match self {
            DeviceRole::Capture => "capture",
            DeviceRole::Render => "render",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opens capture and render devices. `None` selects the host default.
pub trait AudioBackend {
    fn name(&self) -> &'static str;

    /// Open the capture side. Push-model backends deliver `block_frames`-sized
    /// frames straight into `queue` from their own callback thread.
    fn open_capture(
        &self,
        device: Option<&str>,
        block_frames: usize,
        queue: Arc<CaptureQueue>,
    ) -> Result<CaptureHandle, MonitorError>;

    fn open_render(
        &self,
        device: Option<&str>,
        format: AudioFormat,
    ) -> Result<RenderHandle, MonitorError>;
}

/// Keeps a backend stream alive on the thread that opened it. Dropping the
/// guard releases the device.
pub trait StreamGuard {
    /// Stop delivering callbacks. Safe to call more than once.
    fn stop(&mut self) {}
}

/// An open capture device.
pub enum CaptureHandle {
    /// Callbacks already push frames into the capture queue.
    Push {
        format: AudioFormat,
        guard: Box<dyn StreamGuard>,
    },
    /// The caller has to read frames itself.
    Pull(Box<dyn FrameSource>),
}

impl CaptureHandle {
    pub fn format(&self) -> AudioFormat {
        match self {
            CaptureHandle::Push { format, .. } => *format,
            CaptureHandle::Pull(source) => source.format(),
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, CaptureHandle::Push { .. })
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_push() { "push" } else { "pull" };
        f.debug_struct("CaptureHandle")
            .field("kind", &kind)
            .field("format", &self.format())
            .finish()
    }
}

pub enum ReadOutcome {
    Frames(Vec<AudioFrame>),
    /// The source is exhausted (file replay reached its end).
    EndOfStream,
}

/// How a pull source relates to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClock {
    /// Reads block until the device has captured audio.
    Device,
    /// Replay of recorded audio that the reader paces to wall-clock time.
    Paced,
    /// No clock at all: read on demand by the decision thread, so nothing is
    /// ever captured while a trigger plays.
    OnDemand,
}

/// Blocking, pull-model capture. Every read must return within a bounded time.
pub trait FrameSource: Send {
    fn format(&self) -> AudioFormat;

    fn clock(&self) -> SourceClock {
        SourceClock::Device
    }

    /// Read up to `max_frames` blocks.
    fn read_frames(&mut self, max_frames: usize) -> Result<ReadOutcome, MonitorError>;
}

/// Render path for the trigger sound.
pub trait RenderSink: Send {
    fn format(&self) -> AudioFormat;

    /// Queue interleaved samples for output. May block until the host has room.
    fn write_frames(&mut self, samples: &[f32]) -> Result<(), MonitorError>;

    /// Block until everything written so far has been played out.
    fn drain(&mut self) -> Result<(), MonitorError>;
}

/// An open render device: the sink moves to the decision thread, the guard
/// stays behind with whoever owns the device.
pub struct RenderHandle {
    sink: Box<dyn RenderSink>,
    guard: Option<Box<dyn StreamGuard>>,
}

impl RenderHandle {
    pub fn new(sink: Box<dyn RenderSink>) -> Self {
        Self { sink, guard: None }
    }

    pub fn with_guard(sink: Box<dyn RenderSink>, guard: Box<dyn StreamGuard>) -> Self {
        Self {
            sink,
            guard: Some(guard),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.sink.format()
    }

    pub fn into_parts(self) -> (Box<dyn RenderSink>, Option<Box<dyn StreamGuard>>) {
        (self.sink, self.guard)
    }
}

/// Capture from one backend, render through another (e.g. replay a WAV file
/// while shushing through the speakers).
pub struct SplitBackend {
    capture: Box<dyn AudioBackend>,
    render: Box<dyn AudioBackend>,
}

impl SplitBackend {
    pub fn new(capture: Box<dyn AudioBackend>, render: Box<dyn AudioBackend>) -> Self {
        Self { capture, render }
    }
}

impl AudioBackend for SplitBackend {
    fn name(&self) -> &'static str {
        "split"
    }

    fn open_capture(
        &self,
        device: Option<&str>,
        block_frames: usize,
        queue: Arc<CaptureQueue>,
    ) -> Result<CaptureHandle, MonitorError> {
        self.capture.open_capture(device, block_frames, queue)
    }

    fn open_render(
        &self,
        device: Option<&str>,
        format: AudioFormat,
    ) -> Result<RenderHandle, MonitorError> {
        self.render.open_render(device, format)
    }
}
