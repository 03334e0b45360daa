//! Error taxonomy for the capture, scoring and playback pipeline.

use crate::audio::DeviceRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// A capture or render device could not be opened.
    #[error("{role} device '{device}' unavailable: {reason}")]
    DeviceUnavailable {
        role: DeviceRole,
        device: String,
        reason: String,
    },

    /// A single capture read failed.
    #[error("capture read failed: {0}")]
    IoFailure(String),

    /// Capture kept failing until the failure budget ran out.
    #[error("capture lost after {count} consecutive failures")]
    CaptureLost { count: u32 },

    #[error("trigger asset '{asset}' unreadable: {reason}")]
    AssetUnreadable { asset: String, reason: String },

    #[error("render failed: {0}")]
    RenderFailure(String),

    #[error("loudness meter error: {0}")]
    Meter(String),

    #[error("{0} thread failed")]
    Worker(String),
}

impl MonitorError {
    pub(crate) fn device_unavailable(
        role: DeviceRole,
        device: Option<&str>,
        reason: impl ToString,
    ) -> Self {
        MonitorError::DeviceUnavailable {
            role,
            device: device.unwrap_or("default").to_string(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors end monitoring; everything else is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::DeviceUnavailable { .. }
                | MonitorError::CaptureLost { .. }
                | MonitorError::Meter(_)
                | MonitorError::Worker(_)
        )
    }
}
