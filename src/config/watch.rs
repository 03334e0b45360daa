//! Re-reads the config file and reports monitor settings that changed.

use super::AppConfig;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ConfigWatcher {
    /// Unresolved command line, re-resolved on every check.
    cli: AppConfig,
    next_check: Option<Instant>,
    last_error: Option<String>,
}

impl ConfigWatcher {
    pub fn new(cli: AppConfig, current: &AppConfig) -> Self {
        Self {
            cli,
            next_check: current
                .config_poll_interval()
                .map(|interval| Instant::now() + interval),
            last_error: None,
        }
    }

    /// Resolve the command line and config file again, unconditionally.
    pub fn reload(&self) -> Result<AppConfig> {
        self.cli.resolve()
    }

    /// Check the file once its poll interval has elapsed. Yields new settings
    /// only when the resulting monitor configuration differs from `current`.
    pub fn poll(&mut self, now: Instant, current: &AppConfig) -> Option<AppConfig> {
        let interval = current.config_poll_interval()?;
        match self.next_check {
            Some(due) if now < due => return None,
            _ => self.next_check = Some(now + interval),
        }
        self.check(current)
    }

    fn check(&mut self, current: &AppConfig) -> Option<AppConfig> {
        match self.cli.resolve() {
            Ok(next) => {
                self.last_error = None;
                if next.monitor_config() == current.monitor_config() {
                    debug!("config file unchanged");
                    return None;
                }
                Some(next)
            }
            Err(err) => {
                let message = format!("{err:#}");
                if self.last_error.as_deref() != Some(message.as_str()) {
                    warn!(error = %message, "config file rejected; keeping current settings");
                }
                self.last_error = Some(message);
                None
            }
        }
    }
}
