pub const DEFAULT_DECAY: f64 = 0.20;
pub const DEFAULT_THRESHOLD: f64 = 40.0;
pub const DEFAULT_MIN_THRESHOLD: f64 = 40.0;
pub const DEFAULT_MAX_THRESHOLD: f64 = 120.0;
pub const DEFAULT_WINDOW_MS: u64 = 3_000;
pub const DEFAULT_COOLDOWN_SECS: f64 = 0.0;
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 3;
pub const DEFAULT_OPEN_BACKOFF_MS: u64 = 250;
pub const DEFAULT_MAX_IO_FAILURES: u32 = 5;
pub const DEFAULT_VERBOSITY: u8 = 2;
/// Seconds between config file checks when a file is given.
pub const DEFAULT_CONFIG_POLL_SECS: f64 = 10.0;

pub const MIN_WINDOW_MS: u64 = 1_000;
pub const MAX_WINDOW_MS: u64 = 30_000;
pub const MAX_COOLDOWN_SECS: f64 = 3_600.0;
pub const MIN_BLOCK_FRAMES: usize = 64;
pub const MAX_BLOCK_FRAMES: usize = 8_192;
pub const MAX_OPEN_ATTEMPTS: u32 = 10;
pub const MAX_OPEN_BACKOFF_MS: u64 = 10_000;
pub const MAX_IO_FAILURES_LIMIT: u32 = 100;
pub const MAX_VERBOSITY: u8 = 4;
pub const MAX_CONFIG_POLL_SECS: f64 = 86_400.0;

/// Highest capture rate the queue is sized for when checking it can hold a
/// full loudness window.
pub const MAX_CAPTURE_SAMPLE_RATE: u32 = 192_000;
