//! Loudness monitoring: scoring, anti-feedback gating, trigger playback, and
//! the threads that tie them to the audio devices.

mod event_loop;
mod gate;
mod pipeline;
mod playback;
mod score;

pub use event_loop::{LoudnessSample, MonitorLoop, MonitorStats, TriggerState};
pub use gate::{Admit, TriggerGate};
pub use pipeline::{start, MonitorHandle, MonitorSummary};
pub use playback::{PlaybackReport, PlaybackSession, PLAYBACK_CHUNK_FRAMES};
pub use score::{loudness_delta, Decision, ScoreEngine};
