//! Live devices via CPAL.
//!
//! Capture is push-model: the CPAL callback converts whatever sample format the
//! device delivers into mono `f32` blocks and pushes them into the capture
//! queue. Render keeps an output stream open for the life of the pipeline and
//! feeds it through a bounded channel so the callback never blocks.

use super::dispatch::FrameDispatcher;
use super::{
    AudioBackend, AudioFormat, CaptureHandle, CaptureQueue, DeviceRole, RenderHandle, RenderSink,
    StreamGuard,
};
use crate::MonitorError;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Render chunks buffered between the playback session and the callback.
const RENDER_QUEUE_CHUNKS: usize = 16;

/// Longest a single render write may wait for room in the output queue.
const RENDER_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on how long draining may take beyond the queued audio itself.
const RENDER_DRAIN_SLACK: Duration = Duration::from_secs(2);

const RENDER_DRAIN_POLL: Duration = Duration::from_millis(5);

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .context("no output devices available")?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    fn input_device(&self, name: Option<&str>) -> Result<cpal::Device, MonitorError> {
        let unavailable = |reason: String| {
            MonitorError::device_unavailable(DeviceRole::Capture, name, reason)
        };
        match name {
            Some(name) => self
                .host
                .input_devices()
                .map_err(|err| unavailable(err.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| unavailable(format!("input device '{name}' not found"))),
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| unavailable("no default input device available".to_string())),
        }
    }

    fn output_device(&self, name: Option<&str>) -> Result<cpal::Device, MonitorError> {
        let unavailable =
            |reason: String| MonitorError::device_unavailable(DeviceRole::Render, name, reason);
        match name {
            Some(name) => self
                .host
                .output_devices()
                .map_err(|err| unavailable(err.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| unavailable(format!("output device '{name}' not found"))),
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| unavailable("no default output device available".to_string())),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open_capture(
        &self,
        name: Option<&str>,
        block_frames: usize,
        queue: Arc<CaptureQueue>,
    ) -> Result<CaptureHandle, MonitorError> {
        let unavailable =
            |reason: String| MonitorError::device_unavailable(DeviceRole::Capture, name, reason);
        let device = self.input_device(name)?;
        let default_config = device
            .default_input_config()
            .map_err(|err| unavailable(err.to_string()))?;
        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let channels = usize::from(config.channels.max(1));
        // Capture is downmixed to mono before it reaches the queue.
        let format = AudioFormat::mono(config.sample_rate.0);

        info!(
            device = device_label(&device).as_str(),
            sample_format = ?sample_format,
            sample_rate = format.sample_rate,
            channels,
            "opening capture stream"
        );

        let dispatcher = FrameDispatcher::new(block_frames, queue.clone());
        // Convert every supported sample type to f32 up front so the rest of the
        // pipeline can stay format-agnostic.
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_capture_stream(&device, &config, dispatcher, channels, queue, |s: f32| s)
            }
            SampleFormat::I16 => {
                build_capture_stream(&device, &config, dispatcher, channels, queue, |s: i16| {
                    s as f32 / 32_768.0
                })
            }
            SampleFormat::U16 => {
                build_capture_stream(&device, &config, dispatcher, channels, queue, |s: u16| {
                    (s as f32 - 32_768.0) / 32_768.0
                })
            }
            other => return Err(unavailable(format!("unsupported sample format: {other:?}"))),
        }
        .map_err(|err| unavailable(err.to_string()))?;

        stream.play().map_err(|err| unavailable(err.to_string()))?;
        Ok(CaptureHandle::Push {
            format,
            guard: Box::new(CpalStreamGuard {
                stream,
                role: DeviceRole::Capture,
            }),
        })
    }

    fn open_render(
        &self,
        name: Option<&str>,
        format: AudioFormat,
    ) -> Result<RenderHandle, MonitorError> {
        let unavailable =
            |reason: String| MonitorError::device_unavailable(DeviceRole::Render, name, reason);
        let device = self.output_device(name)?;
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            device = device_label(&device).as_str(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "opening render stream"
        );

        let (sender, receiver) = bounded::<Vec<f32>>(RENDER_QUEUE_CHUNKS);
        let played = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let mut feeder = RenderFeeder::new(receiver, played.clone());
        let failed_cb = failed.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| feeder.fill(data),
                move |err| {
                    warn!(error = %err, "render stream error");
                    failed_cb.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|err| unavailable(err.to_string()))?;
        stream.play().map_err(|err| unavailable(err.to_string()))?;

        let sink = CpalRenderSink {
            sender,
            played,
            failed,
            written: 0,
            format,
        };
        Ok(RenderHandle::with_guard(
            Box::new(sink),
            Box::new(CpalStreamGuard {
                stream,
                role: DeviceRole::Render,
            }),
        ))
    }
}

fn device_label(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "unknown device".to_string())
}

fn build_capture_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut dispatcher: FrameDispatcher,
    channels: usize,
    queue: Arc<CaptureQueue>,
    convert: F,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Copy + Send + 'static,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| dispatcher.push(data, channels, convert),
        move |err| {
            warn!(error = %err, "capture stream error");
            queue.report_failure();
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                // No more callbacks will arrive; let the consumer see the loss.
                queue.close();
            }
        },
        None,
    )
}

/// Owns a CPAL stream on the thread that built it.
struct CpalStreamGuard {
    stream: cpal::Stream,
    role: DeviceRole,
}

impl StreamGuard for CpalStreamGuard {
    fn stop(&mut self) {
        if let Err(err) = self.stream.pause() {
            debug!(role = %self.role, error = %err, "failed to pause stream");
        }
    }
}

impl Drop for CpalStreamGuard {
    fn drop(&mut self) {
        debug!(role = %self.role, "releasing stream");
    }
}

/// Output-callback side of the render path. Runs on the audio thread, so it
/// only ever uses `try_recv` and fills gaps with silence.
struct RenderFeeder {
    receiver: Receiver<Vec<f32>>,
    current: Vec<f32>,
    position: usize,
    played: Arc<AtomicU64>,
}

impl RenderFeeder {
    fn new(receiver: Receiver<Vec<f32>>, played: Arc<AtomicU64>) -> Self {
        Self {
            receiver,
            current: Vec::new(),
            position: 0,
            played,
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.position >= self.current.len() {
                match self.receiver.try_recv() {
                    Ok(chunk) => {
                        self.current = chunk;
                        self.position = 0;
                        continue;
                    }
                    Err(_) => {
                        data[written..].fill(0.0);
                        break;
                    }
                }
            }
            let take = (self.current.len() - self.position).min(data.len() - written);
            data[written..written + take]
                .copy_from_slice(&self.current[self.position..self.position + take]);
            self.position += take;
            written += take;
            self.played.fetch_add(take as u64, Ordering::Relaxed);
        }
    }
}

/// Decision-thread side of the render path.
struct CpalRenderSink {
    sender: Sender<Vec<f32>>,
    played: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
    written: u64,
    format: AudioFormat,
}

impl CpalRenderSink {
    fn check_stream(&self) -> Result<(), MonitorError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(MonitorError::RenderFailure(
                "render stream reported an error".to_string(),
            ));
        }
        Ok(())
    }
}

impl RenderSink for CpalRenderSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn write_frames(&mut self, samples: &[f32]) -> Result<(), MonitorError> {
        self.check_stream()?;
        match self
            .sender
            .send_timeout(samples.to_vec(), RENDER_WRITE_TIMEOUT)
        {
            Ok(()) => {
                self.written += samples.len() as u64;
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(MonitorError::RenderFailure(
                "render device stopped consuming audio".to_string(),
            )),
            Err(SendTimeoutError::Disconnected(_)) => Err(MonitorError::RenderFailure(
                "render stream closed".to_string(),
            )),
        }
    }

    fn drain(&mut self) -> Result<(), MonitorError> {
        let pending = self.written.saturating_sub(self.played.load(Ordering::Relaxed));
        let pending_frames = pending / u64::from(self.format.channels.max(1));
        let deadline =
            Instant::now() + self.format.duration_of(pending_frames) + RENDER_DRAIN_SLACK;
        while self.played.load(Ordering::Relaxed) < self.written {
            self.check_stream()?;
            if Instant::now() >= deadline {
                return Err(MonitorError::RenderFailure(
                    "timed out draining render stream".to_string(),
                ));
            }
            thread::sleep(RENDER_DRAIN_POLL);
        }
        Ok(())
    }
}
