use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat JSON settings file. Unknown keys are ignored so a file shared with
/// other tooling still loads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub decay: Option<f64>,
    pub threshold: Option<f64>,
    /// Sensitivity in percent; see [`super::threshold_from_sensitivity`].
    pub sound_threshold: Option<f64>,
    pub min_threshold: Option<f64>,
    pub max_threshold: Option<f64>,
    pub shush_file: Option<PathBuf>,
    /// Asset name; `.wav` is appended when it has no extension.
    pub filename: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    /// Seconds.
    pub cooldown: Option<f64>,
    pub window_ms: Option<u64>,
    pub verbosity: Option<u8>,
    /// Seconds between checks of this file for changes.
    pub poll_interval: Option<f64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The trigger asset named by this file, `shush_file` taking precedence.
    pub fn shush_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.shush_file {
            return Some(path.clone());
        }
        let name = self.filename.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        let mut path = PathBuf::from(name);
        if path.extension().is_none() {
            path.set_extension("wav");
        }
        Some(path)
    }
}
