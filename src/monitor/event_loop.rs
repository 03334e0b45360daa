//! Decision loop: consumes captured frames, scores loudness and drives the
//! trigger/playback cycle. Everything here runs on one thread.

use super::gate::{Admit, TriggerGate};
use super::playback::PlaybackSession;
use super::score::{Decision, ScoreEngine};
use crate::audio::{
    AudioFormat, AudioFrame, Batch, CaptureQueue, FrameSource, LoudnessMeter, ReadOutcome,
    RenderSink, ReplayPacer, SourceClock, TriggerAsset,
};
use crate::config::MonitorConfig;
use crate::MonitorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frames pulled from the queue (or a pull source) per wake-up.
pub(crate) const BATCH_FRAMES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Listening,
    Triggered,
    Playing,
    Shutdown,
}

/// One windowed loudness reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessSample {
    /// Scored audio time since monitoring started.
    pub at: Duration,
    pub lufs: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorStats {
    pub frames_scored: u64,
    /// Frames dropped unscored: gate closed, cooldown, or playback backlog.
    pub frames_discarded: u64,
    pub samples: u64,
    pub triggers: u64,
    pub playback_failures: u64,
    pub io_failures: u64,
    pub last_sample: Option<LoudnessSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Scored,
    Discarded,
    Fired,
}

pub struct MonitorLoop {
    format: AudioFormat,
    meter: LoudnessMeter,
    engine: ScoreEngine,
    gate: TriggerGate,
    playback: PlaybackSession,
    render: Box<dyn RenderSink>,
    asset: TriggerAsset,
    state: TriggerState,
    stop: Arc<AtomicBool>,
    window_frames: u64,
    window_fill: u64,
    audio_clock: u64,
    cooldown_frames: u64,
    max_io_failures: u32,
    overflow_seen: u64,
    stats: MonitorStats,
}

impl MonitorLoop {
    pub fn new(
        config: &MonitorConfig,
        format: AudioFormat,
        render: Box<dyn RenderSink>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            format,
            meter: LoudnessMeter::new(format, config.window)?,
            engine: ScoreEngine::new(config.threshold, config.decay),
            gate: TriggerGate::new(),
            playback: PlaybackSession::new(stop.clone()),
            render,
            asset: config.asset.clone(),
            state: TriggerState::Listening,
            stop,
            window_frames: format.frames_for(config.window).max(1),
            window_fill: 0,
            audio_clock: 0,
            cooldown_frames: format.frames_for(config.cooldown),
            max_io_failures: config.max_io_failures.max(1),
            overflow_seen: 0,
            stats: MonitorStats::default(),
        })
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Consume `queue` until it closes, a stop is requested, or capture is lost.
    pub fn run(mut self, queue: &CaptureQueue) -> Result<MonitorStats, MonitorError> {
        info!(
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            threshold = self.engine.threshold(),
            decay = self.engine.decay(),
            "monitoring started"
        );
        let result = self.drive_queue(queue);
        self.finish(result)
    }

    /// Read `source` directly on this thread. Nothing is read while the
    /// trigger plays: a live source loses that audio, a replay simply resumes
    /// where it left off.
    pub fn run_inline(mut self, source: &mut dyn FrameSource) -> Result<MonitorStats, MonitorError> {
        info!(
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            threshold = self.engine.threshold(),
            decay = self.engine.decay(),
            "monitoring started (single thread)"
        );
        let result = self.drive_source(source);
        self.finish(result)
    }

    fn finish(mut self, result: Result<(), MonitorError>) -> Result<MonitorStats, MonitorError> {
        self.state = TriggerState::Shutdown;
        info!(
            triggers = self.stats.triggers,
            samples = self.stats.samples,
            discarded = self.stats.frames_discarded,
            "monitoring stopped"
        );
        result.map(|()| self.stats)
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn drive_queue(&mut self, queue: &CaptureQueue) -> Result<(), MonitorError> {
        while !self.stopping() {
            let frames = match queue.pop_batch(BATCH_FRAMES) {
                Batch::Closed => return self.capture_closed(queue),
                Batch::Frames(frames) if frames.is_empty() => {
                    self.capture_failed(queue.consecutive_failures())?;
                    continue;
                }
                Batch::Frames(frames) => frames,
            };
            self.note_overflow(queue.overflow_count());

            let mut frames = frames.into_iter();
            while let Some(frame) = frames.next() {
                if self.stopping() {
                    break;
                }
                if self.handle_frame(&frame)? == FrameOutcome::Fired {
                    // Everything captured while the trigger played is stale.
                    let backlog = frames.len() + queue.take_all().len();
                    self.discard(backlog);
                    break;
                }
            }
        }
        Ok(())
    }

    fn drive_source(&mut self, source: &mut dyn FrameSource) -> Result<(), MonitorError> {
        let mut pacer =
            (source.clock() == SourceClock::Paced).then(|| ReplayPacer::new(source.format()));
        let batch = if pacer.is_some() { 1 } else { BATCH_FRAMES };
        let mut failures = 0u32;
        while !self.stopping() {
            let frames = match source.read_frames(batch) {
                Ok(ReadOutcome::Frames(frames)) => frames,
                Ok(ReadOutcome::EndOfStream) => {
                    info!("capture source reached end of stream");
                    return Ok(());
                }
                Err(MonitorError::IoFailure(reason)) => {
                    failures += 1;
                    warn!(error = %reason, failures, "capture read failed");
                    self.capture_failed(failures)?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            failures = 0;
            if let Some(pacer) = pacer.as_mut() {
                let pcm = frames.iter().map(|frame| frame.frame_count() as u64).sum();
                if !pacer.wait(pcm, &self.stop) {
                    break;
                }
            }

            // Blocks read before a trigger were captured before it too, so
            // they are scored once the gate lets them through.
            for frame in &frames {
                if self.stopping() {
                    break;
                }
                self.handle_frame(frame)?;
            }
        }
        Ok(())
    }

    fn capture_closed(&self, queue: &CaptureQueue) -> Result<(), MonitorError> {
        let count = queue.consecutive_failures();
        if count > 0 && !self.stopping() {
            return Err(MonitorError::CaptureLost { count });
        }
        debug!("capture queue closed");
        Ok(())
    }

    fn capture_failed(&mut self, count: u32) -> Result<(), MonitorError> {
        self.stats.io_failures += 1;
        if count >= self.max_io_failures {
            return Err(MonitorError::CaptureLost { count });
        }
        warn!(
            failures = count,
            limit = self.max_io_failures,
            "capture failure"
        );
        Ok(())
    }

    fn note_overflow(&mut self, total: u64) {
        if total > self.overflow_seen {
            warn!(
                dropped = total - self.overflow_seen,
                total, "capture queue overflowed; oldest frames evicted"
            );
            self.overflow_seen = total;
        }
    }

    fn discard(&mut self, frames: usize) {
        if frames > 0 {
            debug!(dropped = frames, "discarded audio captured during playback");
            self.stats.frames_discarded += frames as u64;
        }
    }

    fn handle_frame(&mut self, frame: &AudioFrame) -> Result<FrameOutcome, MonitorError> {
        let frames = frame.frame_count() as u64;
        match self.gate.admit(frames) {
            Admit::Discard => {
                self.stats.frames_discarded += 1;
                return Ok(FrameOutcome::Discarded);
            }
            Admit::Score { reopened: true } => self.resume()?,
            Admit::Score { reopened: false } => {}
        }

        self.meter.add_frames(frame)?;
        self.stats.frames_scored += 1;
        self.audio_clock += frames;
        self.window_fill += frames;
        if self.window_fill < self.window_frames {
            return Ok(FrameOutcome::Scored);
        }
        self.window_fill = 0;

        let sample = LoudnessSample {
            at: self.format.duration_of(self.audio_clock),
            lufs: self.meter.measure()?,
        };
        self.stats.samples += 1;
        self.stats.last_sample = Some(sample);
        let decision = self.engine.observe(sample.lufs);
        info!(
            at_ms = sample.at.as_millis() as u64,
            lufs = sample.lufs,
            score = self.engine.score(),
            threshold = self.engine.threshold(),
            "loudness"
        );

        if decision == Decision::Fire {
            self.trigger(sample)?;
            return Ok(FrameOutcome::Fired);
        }
        Ok(FrameOutcome::Scored)
    }

    fn trigger(&mut self, sample: LoudnessSample) -> Result<(), MonitorError> {
        self.state = TriggerState::Triggered;
        self.stats.triggers += 1;
        info!(lufs = sample.lufs, asset = %self.asset, "trigger fired");

        self.gate.close();
        self.state = TriggerState::Playing;
        match self.playback.play(&self.asset, self.render.as_mut()) {
            Ok(report) => info!(
                samples = report.samples_written,
                interrupted = report.interrupted,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "playback finished"
            ),
            Err(err) if !err.is_fatal() => {
                self.stats.playback_failures += 1;
                warn!(error = %err, "playback failed; monitoring resumes");
            }
            Err(err) => return Err(err),
        }

        self.gate.release(self.cooldown_frames);
        self.state = TriggerState::Listening;
        Ok(())
    }

    /// Start scoring from scratch after the gate reopens.
    fn resume(&mut self) -> Result<(), MonitorError> {
        self.meter.reset()?;
        self.engine.reset();
        self.window_fill = 0;
        debug!("gate reopened; meter reset");
        Ok(())
    }
}
