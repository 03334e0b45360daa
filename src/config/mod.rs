//! Command-line parsing, config-file merging, and validation.
//!
//! Values resolve as CLI flag (or its environment variable), then the JSON
//! config file, then the built-in default.

mod defaults;
mod file;
mod validation;
mod watch;

use crate::audio::{TriggerAsset, DEFAULT_BLOCK_FRAMES, DEFAULT_QUEUE_CAPACITY};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::*;
pub use file::ConfigFile;
pub use validation::threshold_from_sensitivity;
pub use watch::ConfigWatcher;

/// CLI options for the shusher daemon.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "shusherd",
    about = "Listens to a room and plays a shush when it stays too loud",
    author,
    version
)]
pub struct AppConfig {
    /// JSON config file with monitor settings
    #[arg(short = 'C', long, env = "SHUSHER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Re-read the config file this often and restart when it changes
    /// (seconds, 0 = never)
    #[arg(long = "config-poll-secs", value_name = "SECS")]
    pub config_poll_secs: Option<f64>,

    /// Score decay applied after every sub-threshold sample, in (0, 1)
    #[arg(long)]
    pub decay: Option<f64>,

    /// Score above which the shush plays
    #[arg(long, conflicts_with = "sound_threshold")]
    pub threshold: Option<f64>,

    /// Sensitivity in percent, mapped onto [min-threshold, max-threshold]
    #[arg(long = "sound-threshold", value_name = "PERCENT")]
    pub sound_threshold: Option<f64>,

    /// Threshold used for a sound threshold of 0%
    #[arg(long = "min-threshold")]
    pub min_threshold: Option<f64>,

    /// Threshold used for a sound threshold of 100%
    #[arg(long = "max-threshold")]
    pub max_threshold: Option<f64>,

    /// WAV file played when the room is too loud [default: bundled shush]
    #[arg(long = "shush-file", env = "SHUSHER_SHUSH_FILE", value_name = "PATH")]
    pub shush_file: Option<PathBuf>,

    /// Preferred audio input device name
    #[arg(short = 'I', long = "input-device")]
    pub input_device: Option<String>,

    /// Preferred audio output device name
    #[arg(short = 'O', long = "output-device")]
    pub output_device: Option<String>,

    /// Extra quiet time after a shush before scoring resumes (seconds)
    #[arg(long)]
    pub cooldown: Option<f64>,

    /// Loudness window (milliseconds)
    #[arg(long = "window-ms")]
    pub window_ms: Option<u64>,

    /// Frames per captured audio block
    #[arg(long = "block-frames", default_value_t = DEFAULT_BLOCK_FRAMES)]
    pub block_frames: usize,

    /// Capture queue capacity (audio blocks)
    #[arg(long = "queue-capacity", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Attempts at opening each audio device before giving up
    #[arg(long = "open-attempts", default_value_t = DEFAULT_OPEN_ATTEMPTS)]
    pub open_attempts: u32,

    /// Initial backoff between device open attempts (milliseconds)
    #[arg(long = "open-backoff-ms", default_value_t = DEFAULT_OPEN_BACKOFF_MS)]
    pub open_backoff_ms: u64,

    /// Consecutive capture failures tolerated before monitoring stops
    #[arg(long = "max-io-failures", default_value_t = DEFAULT_MAX_IO_FAILURES)]
    pub max_io_failures: u32,

    /// Run capture and scoring on one thread (file replay only)
    #[arg(long = "single-thread", default_value_t = false)]
    pub single_thread: bool,

    /// Replay a WAV file instead of capturing from a device
    #[arg(long = "input-wav", value_name = "PATH")]
    pub input_wav: Option<PathBuf>,

    /// Write played shushes to a WAV file instead of a device
    #[arg(long = "output-wav", value_name = "PATH")]
    pub output_wav: Option<PathBuf>,

    /// Replay --input-wav as fast as possible instead of in real time
    #[arg(long = "fast-replay", default_value_t = false, requires = "input_wav")]
    pub fast_replay: bool,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print detected audio output devices and exit
    #[arg(long = "list-output-devices", default_value_t = false)]
    pub list_output_devices: bool,

    /// Log verbosity: 0 = errors only .. 4 = trace
    #[arg(short = 'v', long)]
    pub verbosity: Option<u8>,

    /// Log line format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stderr
    #[arg(long = "log-file", env = "SHUSHER_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Capture and decision run on separate threads.
    #[default]
    Threaded,
    /// Pull sources only: one thread reads and scores.
    Inline,
}

/// Settings consumed by the monitor core. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub decay: f64,
    pub threshold: f64,
    pub window: Duration,
    pub asset: TriggerAsset,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub cooldown: Duration,
    pub block_frames: usize,
    pub queue_capacity: usize,
    pub open_attempts: u32,
    pub open_backoff: Duration,
    pub max_io_failures: u32,
    pub capture_mode: CaptureMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            threshold: DEFAULT_THRESHOLD,
            window: Duration::from_millis(DEFAULT_WINDOW_MS),
            asset: TriggerAsset::Bundled,
            input_device: None,
            output_device: None,
            cooldown: Duration::ZERO,
            block_frames: DEFAULT_BLOCK_FRAMES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
            open_backoff: Duration::from_millis(DEFAULT_OPEN_BACKOFF_MS),
            max_io_failures: DEFAULT_MAX_IO_FAILURES,
            capture_mode: CaptureMode::Threaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub verbosity: u8,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            verbosity: DEFAULT_VERBOSITY,
            format: LogFormat::Text,
            file: None,
        }
    }
}

impl AppConfig {
    /// Monitor settings with defaults filled in. Call on a resolved config.
    pub fn monitor_config(&self) -> MonitorConfig {
        let capture_mode = if self.single_thread {
            CaptureMode::Inline
        } else {
            CaptureMode::Threaded
        };
        MonitorConfig {
            decay: self.decay.unwrap_or(DEFAULT_DECAY),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            window: Duration::from_millis(self.window_ms.unwrap_or(DEFAULT_WINDOW_MS)),
            asset: self
                .shush_file
                .clone()
                .map(TriggerAsset::File)
                .unwrap_or_default(),
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            cooldown: Duration::try_from_secs_f64(self.cooldown.unwrap_or(DEFAULT_COOLDOWN_SECS))
                .unwrap_or(Duration::ZERO),
            block_frames: self.block_frames,
            queue_capacity: self.queue_capacity,
            open_attempts: self.open_attempts,
            open_backoff: Duration::from_millis(self.open_backoff_ms),
            max_io_failures: self.max_io_failures,
            capture_mode,
        }
    }

    /// How often to re-read the config file; `None` without a file or when
    /// polling is switched off.
    pub fn config_poll_interval(&self) -> Option<Duration> {
        self.config.as_ref()?;
        let secs = self.config_poll_secs.unwrap_or(DEFAULT_CONFIG_POLL_SECS);
        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|interval| !interval.is_zero())
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            verbosity: self.verbosity.unwrap_or(DEFAULT_VERBOSITY),
            format: self.log_format,
            file: self.log_file.clone(),
        }
    }
}
