//! # OS termination signals as close requests.
//!
//! Provides [`wait_for_close_signal`] — completes when the process
//! receives a termination signal — and [`request_close_on_signal`],
//! which forwards the first signal into a pump's close protocol so
//! subscribers get their veto window before the application exits.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::pump::EventPump;

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(unix)]
pub async fn wait_for_close_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(not(unix))]
pub async fn wait_for_close_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawns a task that turns the first termination signal into
/// [`request_close`](EventPump::request_close) on the given pump.
///
/// Subscribers keep their veto window: a vetoed request leaves the pump
/// open, and a later signal requests closing again only if the task is
/// re-armed by calling this again.
pub fn request_close_on_signal(pump: &Arc<EventPump>) -> JoinHandle<()> {
    let pump = Arc::clone(pump);
    tokio::spawn(async move {
        match wait_for_close_signal().await {
            Ok(()) => pump.request_close(),
            Err(error) => {
                tracing::warn!(pump = pump.label(), %error, "signal registration failed");
            }
        }
    })
}
