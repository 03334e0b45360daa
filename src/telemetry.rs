//! Tracing subscriber setup for the daemon.

use crate::config::{LogFormat, LogSettings};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::panic;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Overrides `--verbosity` with a full filter directive when set.
pub const LOG_ENV: &str = "SHUSHER_LOG";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Level directive for a verbosity of 0 (errors) through 4 (trace).
pub fn verbosity_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Later calls are no-ops, so a config reload
/// keeps the first sink.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(settings.verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_thread_names(true);

    let installed = match (&settings.file, settings.format) {
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match format {
                LogFormat::Json => tracing::subscriber::set_global_default(
                    builder
                        .json()
                        .with_current_span(false)
                        .with_span_list(false)
                        .finish(),
                ),
                LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
            }
        }
        (None, LogFormat::Json) => tracing::subscriber::set_global_default(
            builder
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr)
                .finish(),
        ),
        (None, LogFormat::Text) => {
            tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
        }
    };
    installed.context("a global tracing subscriber is already installed")?;
    let _ = TRACING_INIT.set(());
    Ok(())
}

/// Route panics through tracing before the default hook prints them.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        tracing::error!(
            thread = thread.name().unwrap_or("unnamed"),
            panic = %info,
            "panic"
        );
        previous(info);
    }));
}
