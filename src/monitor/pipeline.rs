//! Opens devices, spawns the capture and decision threads, and owns shutdown.

use super::event_loop::{MonitorLoop, MonitorStats, BATCH_FRAMES};
use crate::audio::{
    AudioBackend, AudioFormat, CaptureHandle, CaptureQueue, DeviceRole, FrameSource, PushOutcome,
    ReadOutcome, ReplayPacer, SourceClock, StreamGuard,
};
use crate::config::{CaptureMode, MonitorConfig};
use crate::MonitorError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CAPTURE_THREAD: &str = "shusher-capture";
const MONITOR_THREAD: &str = "shusher-monitor";

/// Final counters reported by [`MonitorHandle::stop`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSummary {
    pub stats: MonitorStats,
    /// Frames evicted from the capture queue because it was full.
    pub frames_overflowed: u64,
}

/// A running monitor. Must stay on the thread that called [`start`]: live
/// audio streams are tied to it.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    queue: Arc<CaptureQueue>,
    capture_guard: Option<Box<dyn StreamGuard>>,
    render_guard: Option<Box<dyn StreamGuard>>,
    producer: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<Result<MonitorStats, MonitorError>>>,
    done: Receiver<()>,
}

/// Open capture and render through `backend` and start monitoring.
///
/// Opening is retried with exponential backoff; a render failure releases the
/// already-open capture device before the error is returned.
pub fn start(config: MonitorConfig, backend: &dyn AudioBackend) -> Result<MonitorHandle, MonitorError> {
    let stop = Arc::new(AtomicBool::new(false));
    let queue = Arc::new(CaptureQueue::new(config.queue_capacity));

    let capture = open_with_retry(&config, DeviceRole::Capture, || {
        backend.open_capture(
            config.input_device.as_deref(),
            config.block_frames,
            queue.clone(),
        )
    })?;
    let capture_format = capture.format();
    check_queue_capacity(&config, capture_format, queue.capacity());

    let render_format = render_format(&config);
    let render = match open_with_retry(&config, DeviceRole::Render, || {
        backend.open_render(config.output_device.as_deref(), render_format)
    }) {
        Ok(render) => render,
        Err(err) => {
            release_capture(capture);
            return Err(err);
        }
    };
    let (sink, render_guard) = render.into_parts();

    let monitor_loop = match MonitorLoop::new(&config, capture_format, sink, stop.clone()) {
        Ok(monitor_loop) => monitor_loop,
        Err(err) => {
            release_capture(capture);
            return Err(err);
        }
    };

    info!(
        backend = backend.name(),
        sample_rate = capture_format.sample_rate,
        block_frames = config.block_frames,
        window_ms = config.window.as_millis() as u64,
        "capture started"
    );

    let (done_tx, done) = bounded::<()>(0);
    let mut handle = MonitorHandle {
        stop: stop.clone(),
        queue: queue.clone(),
        capture_guard: None,
        render_guard,
        producer: None,
        monitor: None,
        done,
    };

    // An early return drops `handle`, which shuts down whatever did start.
    match capture {
        CaptureHandle::Push { guard, .. } => {
            if config.capture_mode == CaptureMode::Inline {
                warn!("single-thread mode needs a pull capture source; running threaded");
            }
            handle.capture_guard = Some(guard);
            handle.monitor = Some(spawn_monitor(done_tx, move || monitor_loop.run(&queue))?);
        }
        CaptureHandle::Pull(mut source)
            if config.capture_mode == CaptureMode::Inline
                || source.clock() == SourceClock::OnDemand =>
        {
            if config.capture_mode == CaptureMode::Threaded {
                debug!("capture source has no clock; reading it on the decision thread");
            }
            handle.monitor = Some(spawn_monitor(done_tx, move || {
                monitor_loop.run_inline(source.as_mut())
            })?);
        }
        CaptureHandle::Pull(source) => {
            handle.producer = Some(spawn_producer(
                source,
                queue.clone(),
                stop,
                config.max_io_failures,
            )?);
            handle.monitor = Some(spawn_monitor(done_tx, move || monitor_loop.run(&queue))?);
        }
    }
    Ok(handle)
}

impl MonitorHandle {
    /// Wait up to `timeout` for monitoring to end on its own (end of stream or
    /// fatal capture failure). Returns `true` once it has ended.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Request a stop and block until both threads have exited and every
    /// device is released.
    pub fn stop(mut self) -> Result<MonitorSummary, MonitorError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<MonitorSummary, MonitorError> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(guard) = self.capture_guard.as_mut() {
            guard.stop();
        }
        self.queue.close();

        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                error!("capture thread panicked");
            }
        }
        let result = match self.monitor.take() {
            Some(monitor) => monitor
                .join()
                .unwrap_or_else(|_| Err(MonitorError::Worker(MONITOR_THREAD.to_string()))),
            None => Ok(MonitorStats::default()),
        };

        self.capture_guard = None;
        self.render_guard = None;
        let frames_overflowed = self.queue.overflow_count();
        debug!(frames_overflowed, "audio devices released");
        result.map(|stats| MonitorSummary {
            stats,
            frames_overflowed,
        })
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.monitor.is_some() || self.producer.is_some() || self.capture_guard.is_some() {
            if let Err(err) = self.shutdown() {
                warn!(error = %err, "monitor ended with error during drop");
            }
        }
    }
}

fn open_with_retry<T>(
    config: &MonitorConfig,
    role: DeviceRole,
    mut open: impl FnMut() -> Result<T, MonitorError>,
) -> Result<T, MonitorError> {
    let attempts = config.open_attempts.max(1);
    let mut backoff = config.open_backoff;
    let mut attempt = 1;
    loop {
        match open() {
            Ok(opened) => return Ok(opened),
            Err(err @ MonitorError::DeviceUnavailable { .. }) if attempt < attempts => {
                warn!(
                    role = %role,
                    attempt,
                    attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "device open failed; retrying"
                );
                thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => {
                error!(role = %role, attempts = attempt, error = %err, "device open failed");
                return Err(err);
            }
        }
    }
}

/// Render is negotiated from the trigger asset's header so playback never
/// needs resampling.
fn render_format(config: &MonitorConfig) -> AudioFormat {
    match config.asset.header_format() {
        Ok(format) => format,
        Err(reason) => {
            let fallback = AudioFormat::default();
            warn!(
                asset = %config.asset,
                error = %reason,
                sample_rate = fallback.sample_rate,
                "trigger asset unreadable; opening render with fallback format"
            );
            fallback
        }
    }
}

fn check_queue_capacity(config: &MonitorConfig, format: AudioFormat, capacity: usize) {
    let window_blocks = format
        .frames_for(config.window)
        .div_ceil(config.block_frames.max(1) as u64);
    if (capacity as u64) < window_blocks {
        warn!(
            capacity,
            window_blocks, "capture queue holds less than one loudness window"
        );
    }
}

fn release_capture(capture: CaptureHandle) {
    if let CaptureHandle::Push { mut guard, .. } = capture {
        guard.stop();
    }
    debug!("capture device released");
}

fn spawn_monitor<F>(
    done: Sender<()>,
    run: F,
) -> Result<JoinHandle<Result<MonitorStats, MonitorError>>, MonitorError>
where
    F: FnOnce() -> Result<MonitorStats, MonitorError> + Send + 'static,
{
    thread::Builder::new()
        .name(MONITOR_THREAD.to_string())
        .spawn(move || {
            let result = run();
            if let Err(err) = &result {
                error!(error = %err, "monitoring ended with error");
            }
            drop(done);
            result
        })
        .map_err(|err| MonitorError::Worker(format!("{MONITOR_THREAD}: {err}")))
}

fn spawn_producer(
    source: Box<dyn FrameSource>,
    queue: Arc<CaptureQueue>,
    stop: Arc<AtomicBool>,
    max_failures: u32,
) -> Result<JoinHandle<()>, MonitorError> {
    thread::Builder::new()
        .name(CAPTURE_THREAD.to_string())
        .spawn(move || run_producer(source, &queue, &stop, max_failures))
        .map_err(|err| MonitorError::Worker(format!("{CAPTURE_THREAD}: {err}")))
}

/// Pull-model capture loop. Never waits on the consumer; the queue evicts
/// instead. Paced replays are read one block at a time and held back until
/// each block is due.
fn run_producer(
    mut source: Box<dyn FrameSource>,
    queue: &CaptureQueue,
    stop: &AtomicBool,
    max_failures: u32,
) {
    let mut pacer =
        (source.clock() == SourceClock::Paced).then(|| ReplayPacer::new(source.format()));
    let batch = if pacer.is_some() { 1 } else { BATCH_FRAMES };
    while !stop.load(Ordering::Relaxed) {
        match source.read_frames(batch) {
            Ok(ReadOutcome::Frames(frames)) => {
                if let Some(pacer) = pacer.as_mut() {
                    let pcm = frames.iter().map(|frame| frame.frame_count() as u64).sum();
                    if !pacer.wait(pcm, stop) {
                        break;
                    }
                }
                for frame in frames {
                    if queue.push(frame) == PushOutcome::Closed {
                        return;
                    }
                }
            }
            Ok(ReadOutcome::EndOfStream) => {
                info!("capture source reached end of stream");
                break;
            }
            Err(err) => {
                let failures = queue.report_failure();
                warn!(error = %err, failures, "capture read failed");
                if failures >= max_failures.max(1) {
                    error!(failures, "giving up on capture");
                    break;
                }
            }
        }
    }
    queue.close();
}
