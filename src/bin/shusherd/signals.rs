use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT, SIGTERM, or SIGQUIT.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Set by SIGHUP: re-read the config file and restart monitoring.
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_reload(_: libc::c_int) {
    RELOAD_REQUESTED.store(true, Ordering::SeqCst);
}

pub(crate) fn install() -> Result<()> {
    let shutdown = handle_shutdown as *const () as libc::sighandler_t;
    let reload = handle_reload as *const () as libc::sighandler_t;
    for (signal, handler, name) in [
        (libc::SIGINT, shutdown, "SIGINT"),
        (libc::SIGTERM, shutdown, "SIGTERM"),
        (libc::SIGQUIT, shutdown, "SIGQUIT"),
        (libc::SIGHUP, reload, "SIGHUP"),
    ] {
        // SAFETY: both handlers only store to an atomic flag, which is
        // async-signal-safe.
        if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
            return Err(anyhow!("failed to install {name} handler"));
        }
    }
    Ok(())
}

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub(crate) fn take_reload() -> bool {
    RELOAD_REQUESTED.swap(false, Ordering::SeqCst)
}
