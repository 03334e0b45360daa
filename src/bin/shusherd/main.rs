//! shusherd: listens to a room and plays a shush when it stays too loud.
//!
//! Runs until SIGINT/SIGTERM/SIGQUIT or until capture ends (file replay
//! reaching its end, or a lost device). SIGHUP re-reads the config file and
//! restarts monitoring with the new settings; the file is also polled and a
//! change to the monitor settings restarts monitoring the same way.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use shusher::audio::{AudioBackend, CpalBackend, SplitBackend, WavBackend};
use shusher::config::{AppConfig, ConfigWatcher};
use shusher::telemetry::{init_tracing, install_panic_hook};
use shusher::{start, MonitorHandle, MonitorSummary};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the main thread checks for signals while monitoring runs.
const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Comma-separated device names that stand in for the host's devices.
const TEST_DEVICES_ENV: &str = "SHUSHER_TEST_DEVICES";

enum Event {
    Shutdown,
    Finished,
    Reload(Box<AppConfig>),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "shusherd failed");
            eprintln!("shusherd: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = AppConfig::parse();
    if cli.list_input_devices || cli.list_output_devices {
        if cli.list_input_devices {
            list_devices("input", CpalBackend::list_input_devices);
        }
        if cli.list_output_devices {
            list_devices("output", CpalBackend::list_output_devices);
        }
        return Ok(());
    }

    let mut config = cli.resolve()?;
    init_tracing(&config.log_settings())?;
    install_panic_hook();
    signals::install()?;

    let mut watcher = ConfigWatcher::new(cli, &config);
    let mut handle = start_monitor(&config)?;
    info!("shusherd started");
    loop {
        match wait_for_event(&handle, &mut watcher, &config) {
            Event::Shutdown => {
                info!("shutdown requested");
                break;
            }
            Event::Finished => {
                info!("capture ended");
                break;
            }
            Event::Reload(next) => {
                info!("reloading configuration");
                report(&handle.stop()?);
                config = *next;
                handle = start_monitor(&config)?;
            }
        }
    }

    report(&handle.stop()?);
    info!("exiting");
    Ok(())
}

fn start_monitor(config: &AppConfig) -> Result<MonitorHandle> {
    let monitor = config.monitor_config();
    debug!(
        decay = monitor.decay,
        threshold = monitor.threshold,
        window_ms = monitor.window.as_millis() as u64,
        cooldown_ms = monitor.cooldown.as_millis() as u64,
        asset = %monitor.asset,
        input_device = monitor.input_device.as_deref().unwrap_or("default"),
        output_device = monitor.output_device.as_deref().unwrap_or("default"),
        "settings"
    );
    let backend = select_backend(config);
    start(monitor, backend.as_ref()).context("failed to start monitoring")
}

/// WAV files stand in for whichever side was given one; live devices cover
/// the rest.
fn select_backend(config: &AppConfig) -> Box<dyn AudioBackend> {
    let realtime = !config.fast_replay;
    match (&config.input_wav, &config.output_wav) {
        (None, None) => Box::new(CpalBackend::new()),
        (Some(_), Some(_)) => Box::new(
            WavBackend::new(config.input_wav.clone(), config.output_wav.clone())
                .realtime(realtime),
        ),
        (Some(input), None) => Box::new(SplitBackend::new(
            Box::new(WavBackend::new(Some(input.clone()), None).realtime(realtime)),
            Box::new(CpalBackend::new()),
        )),
        (None, Some(output)) => Box::new(SplitBackend::new(
            Box::new(CpalBackend::new()),
            Box::new(WavBackend::new(None, Some(output.clone()))),
        )),
    }
}

fn wait_for_event(
    handle: &MonitorHandle,
    watcher: &mut ConfigWatcher,
    current: &AppConfig,
) -> Event {
    loop {
        if signals::shutdown_requested() {
            return Event::Shutdown;
        }
        if signals::take_reload() {
            match watcher.reload() {
                Ok(next) => return Event::Reload(Box::new(next)),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "reload rejected; keeping current settings");
                }
            }
        }
        if let Some(next) = watcher.poll(Instant::now(), current) {
            info!("config file changed");
            return Event::Reload(Box::new(next));
        }
        if handle.wait_timeout(SIGNAL_POLL) {
            return Event::Finished;
        }
    }
}

fn report(summary: &MonitorSummary) {
    let stats = &summary.stats;
    info!(
        samples = stats.samples,
        triggers = stats.triggers,
        frames_scored = stats.frames_scored,
        frames_discarded = stats.frames_discarded,
        frames_overflowed = summary.frames_overflowed,
        playback_failures = stats.playback_failures,
        "monitoring summary"
    );
}

fn list_devices(kind: &str, host_devices: fn() -> Result<Vec<String>>) {
    let devices = match std::env::var(TEST_DEVICES_ENV) {
        Ok(raw) => raw
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Err(_) => host_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio {kind} devices: {err:#}");
            Vec::new()
        }),
    };

    if devices.is_empty() {
        println!("No audio {kind} devices detected.");
    } else {
        println!("Available audio {kind} devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
}
