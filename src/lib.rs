//! Ambient noise moderation: listen to a microphone, score sustained loudness,
//! and play a quieting sound when the room gets too loud.
//!
//! The crate is split into the audio plumbing ([`audio`]), the decision side
//! ([`monitor`]) and the ambient pieces (configuration, logging).

pub mod audio;
pub mod config;
mod error;
mod lock;
pub mod monitor;
pub mod telemetry;

pub(crate) use lock::lock_or_recover;
pub use error::MonitorError;
pub use monitor::{start, MonitorHandle, MonitorSummary};
