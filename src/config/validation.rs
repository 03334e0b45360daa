use super::defaults::{
    DEFAULT_MAX_THRESHOLD, DEFAULT_MIN_THRESHOLD, DEFAULT_WINDOW_MS, MAX_BLOCK_FRAMES,
    MAX_CAPTURE_SAMPLE_RATE, MAX_CONFIG_POLL_SECS, MAX_COOLDOWN_SECS, MAX_IO_FAILURES_LIMIT,
    MAX_OPEN_ATTEMPTS, MAX_OPEN_BACKOFF_MS, MAX_VERBOSITY, MAX_WINDOW_MS, MIN_BLOCK_FRAMES,
    MIN_WINDOW_MS,
};
use super::{AppConfig, ConfigFile};
use anyhow::{bail, Result};
use clap::Parser;

/// Map a 0-100 % sensitivity onto `[min, max]`.
pub fn threshold_from_sensitivity(percent: f64, min: f64, max: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&percent) {
        bail!("sound threshold must be between 0 and 100 percent, got {percent}");
    }
    if !(min.is_finite() && max.is_finite()) || min <= 0.0 || max < min {
        bail!("threshold range must satisfy 0 < min <= max, got [{min}, {max}]");
    }
    Ok(min + (max - min) * percent / 100.0)
}

impl AppConfig {
    /// Parse CLI arguments, merge the config file, and validate.
    pub fn parse_args() -> Result<Self> {
        Self::parse().resolve()
    }

    /// Merge the config file (if any) under the CLI values and validate the
    /// result. `self` is left untouched so it can be resolved again on reload.
    pub fn resolve(&self) -> Result<Self> {
        let mut resolved = self.clone();
        if let Some(path) = &self.config {
            resolved.merge_file(ConfigFile::load(path)?);
        }
        resolved.apply_sensitivity()?;
        resolved.validate()?;
        Ok(resolved)
    }

    fn merge_file(&mut self, file: ConfigFile) {
        let threshold_on_cli = self.threshold.is_some() || self.sound_threshold.is_some();
        if !threshold_on_cli {
            self.threshold = file.threshold;
            self.sound_threshold = file.sound_threshold;
        }
        let shush_path = file.shush_path();
        fill(&mut self.decay, file.decay);
        fill(&mut self.min_threshold, file.min_threshold);
        fill(&mut self.max_threshold, file.max_threshold);
        fill(&mut self.shush_file, shush_path);
        fill(&mut self.input_device, file.input_device);
        fill(&mut self.output_device, file.output_device);
        fill(&mut self.cooldown, file.cooldown);
        fill(&mut self.window_ms, file.window_ms);
        fill(&mut self.verbosity, file.verbosity);
        fill(&mut self.config_poll_secs, file.poll_interval);
    }

    /// An explicit threshold wins over a sensitivity percentage.
    fn apply_sensitivity(&mut self) -> Result<()> {
        if self.threshold.is_none() {
            if let Some(percent) = self.sound_threshold {
                self.threshold = Some(threshold_from_sensitivity(
                    percent,
                    self.min_threshold.unwrap_or(DEFAULT_MIN_THRESHOLD),
                    self.max_threshold.unwrap_or(DEFAULT_MAX_THRESHOLD),
                )?);
            }
        }
        Ok(())
    }

    /// Check resolved values against their bounds.
    pub fn validate(&self) -> Result<()> {
        if let Some(decay) = self.decay {
            if !(decay > 0.0 && decay < 1.0) {
                bail!("decay must be strictly between 0 and 1, got {decay}");
            }
        }
        if let Some(threshold) = self.threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                bail!("threshold must be a positive number, got {threshold}");
            }
        }
        let window_ms = self.window_ms.unwrap_or(DEFAULT_WINDOW_MS);
        if !(MIN_WINDOW_MS..=MAX_WINDOW_MS).contains(&window_ms) {
            bail!("--window-ms must be between {MIN_WINDOW_MS} and {MAX_WINDOW_MS}, got {window_ms}");
        }
        if let Some(cooldown) = self.cooldown {
            if !(0.0..=MAX_COOLDOWN_SECS).contains(&cooldown) {
                bail!("cooldown must be between 0 and {MAX_COOLDOWN_SECS} seconds, got {cooldown}");
            }
        }
        if !(MIN_BLOCK_FRAMES..=MAX_BLOCK_FRAMES).contains(&self.block_frames) {
            bail!(
                "--block-frames must be between {MIN_BLOCK_FRAMES} and {MAX_BLOCK_FRAMES}, got {}",
                self.block_frames
            );
        }
        let window_blocks = min_queue_capacity(window_ms, self.block_frames);
        if self.queue_capacity < window_blocks {
            bail!(
                "--queue-capacity must hold at least one loudness window ({window_blocks} blocks), got {}",
                self.queue_capacity
            );
        }
        if !(1..=MAX_OPEN_ATTEMPTS).contains(&self.open_attempts) {
            bail!(
                "--open-attempts must be between 1 and {MAX_OPEN_ATTEMPTS}, got {}",
                self.open_attempts
            );
        }
        if self.open_backoff_ms > MAX_OPEN_BACKOFF_MS {
            bail!(
                "--open-backoff-ms must be at most {MAX_OPEN_BACKOFF_MS}, got {}",
                self.open_backoff_ms
            );
        }
        if !(1..=MAX_IO_FAILURES_LIMIT).contains(&self.max_io_failures) {
            bail!(
                "--max-io-failures must be between 1 and {MAX_IO_FAILURES_LIMIT}, got {}",
                self.max_io_failures
            );
        }
        if let Some(verbosity) = self.verbosity {
            if verbosity > MAX_VERBOSITY {
                bail!("verbosity must be between 0 and {MAX_VERBOSITY}, got {verbosity}");
            }
        }
        if let Some(secs) = self.config_poll_secs {
            if !(0.0..=MAX_CONFIG_POLL_SECS).contains(&secs) {
                bail!("config poll interval must be between 0 and {MAX_CONFIG_POLL_SECS} seconds, got {secs}");
            }
        }
        for (flag, device) in [
            ("--input-device", &self.input_device),
            ("--output-device", &self.output_device),
        ] {
            if device.as_deref().is_some_and(|name| name.trim().is_empty()) {
                bail!("{flag} must not be empty");
            }
        }
        if self.single_thread && self.input_wav.is_none() {
            bail!("--single-thread needs --input-wav; live devices always capture on their own thread");
        }
        Ok(())
    }
}

/// Blocks needed to hold one window at the highest supported capture rate.
pub(super) fn min_queue_capacity(window_ms: u64, block_frames: usize) -> usize {
    let frames = window_ms * u64::from(MAX_CAPTURE_SAMPLE_RATE) / 1_000;
    frames.div_ceil(block_frames.max(1) as u64) as usize
}

fn fill<T>(slot: &mut Option<T>, fallback: Option<T>) {
    if slot.is_none() {
        *slot = fallback;
    }
}
