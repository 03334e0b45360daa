//! EBU R128 loudness over a trailing window.

use super::{AudioFormat, AudioFrame};
use crate::MonitorError;
use ebur128::{EbuR128, Mode};
use std::time::Duration;

/// Reported instead of `-inf` when the window holds silence (or nothing yet).
pub const SILENCE_FLOOR_LUFS: f64 = -200.0;

/// Windowed loudness meter. Single-threaded: owned by the decision loop.
pub struct LoudnessMeter {
    inner: EbuR128,
    format: AudioFormat,
    window_ms: u32,
}

impl LoudnessMeter {
    pub fn new(format: AudioFormat, window: Duration) -> Result<Self, MonitorError> {
        let window_ms = u32::try_from(window.as_millis())
            .map_err(|_| MonitorError::Meter(format!("window {window:?} too long")))?
            .max(1);
        Ok(Self {
            inner: build_state(format, window_ms)?,
            format,
            window_ms,
        })
    }

    pub fn add_frames(&mut self, frame: &AudioFrame) -> Result<(), MonitorError> {
        if frame.channels() != self.format.channels {
            return Err(MonitorError::Meter(format!(
                "frame has {} channels, meter expects {}",
                frame.channels(),
                self.format.channels
            )));
        }
        self.inner
            .add_frames_f32(frame.samples())
            .map_err(|err| MonitorError::Meter(format!("{err:?}")))
    }

    /// Loudness of the trailing window, independent of how often it is called.
    pub fn measure(&self) -> Result<f64, MonitorError> {
        let lufs = self
            .inner
            .loudness_window(self.window_ms)
            .map_err(|err| MonitorError::Meter(format!("{err:?}")))?;
        Ok(floor_loudness(lufs))
    }

    /// Forget everything measured so far.
    pub fn reset(&mut self) -> Result<(), MonitorError> {
        self.inner = build_state(self.format, self.window_ms)?;
        Ok(())
    }
}

fn build_state(format: AudioFormat, window_ms: u32) -> Result<EbuR128, MonitorError> {
    let mut state = EbuR128::new(u32::from(format.channels), format.sample_rate, Mode::S)
        .map_err(|err| MonitorError::Meter(format!("{err:?}")))?;
    state
        .set_max_window(window_ms)
        .map_err(|err| MonitorError::Meter(format!("{err:?}")))?;
    Ok(state)
}

fn floor_loudness(lufs: f64) -> f64 {
    if lufs.is_finite() && lufs > SILENCE_FLOOR_LUFS {
        lufs
    } else {
        SILENCE_FLOOR_LUFS
    }
}
