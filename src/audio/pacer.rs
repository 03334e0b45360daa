use super::AudioFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep, so a stop request is noticed promptly.
const PACE_SLICE: Duration = Duration::from_millis(10);

/// Holds a paced replay back to wall-clock time.
pub(crate) struct ReplayPacer {
    started: Instant,
    format: AudioFormat,
    frames: u64,
}

impl ReplayPacer {
    pub(crate) fn new(format: AudioFormat) -> Self {
        Self {
            started: Instant::now(),
            format,
            frames: 0,
        }
    }

    /// Account for `frames` more PCM frames and wait until they would have
    /// been captured live. Returns `false` as soon as `stop` is set.
    pub(crate) fn wait(&mut self, frames: u64, stop: &AtomicBool) -> bool {
        self.frames += frames;
        let due = self.started + self.format.duration_of(self.frames);
        loop {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= due {
                return true;
            }
            thread::sleep((due - now).min(PACE_SLICE));
        }
    }
}
