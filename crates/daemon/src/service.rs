//! Systemd integration
//!
//! Speaks the sd-notify datagram protocol: readiness once the reader has been
//! synchronised, a status line per presence change, and watchdog keepalives.
//! Every call is a no-op outside systemd.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use std::time::Duration;
use tracing::{debug, error, info};

/// Send one sd-notify message; `Ok(false)` when not running under systemd
fn send(message: &str) -> Result<bool> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        return Ok(false);
    };

    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(message.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send '{}' to systemd", message))?;
    Ok(true)
}

/// Tell systemd the daemon finished startup synchronisation
pub fn notify_ready() -> Result<()> {
    if send("READY=1")? {
        info!("Notified systemd: service ready");
    } else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
    }
    Ok(())
}

/// Tell systemd the daemon is shutting down
pub fn notify_stopping() -> Result<()> {
    if send("STOPPING=1")? {
        info!("Notified systemd: service stopping");
    }
    Ok(())
}

/// Status line shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    if send(&format!("STATUS={}", status))? {
        debug!("Notified systemd: status = {}", status);
    }
    Ok(())
}

pub fn notify_watchdog() -> Result<()> {
    send("WATCHDOG=1").map(|_| ())
}

/// Watchdog timeout configured by systemd (in microseconds)
pub fn get_watchdog_timeout() -> Option<u64> {
    env::var("WATCHDOG_USEC").ok().and_then(|s| s.parse().ok())
}

pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Keepalive period: half the watchdog timeout, at least one second
pub fn watchdog_interval(timeout_usec: u64) -> Duration {
    Duration::from_secs(((timeout_usec / 1_000_000) / 2).max(1))
}

/// Spawn a task sending WATCHDOG=1 at half the configured interval
///
/// Returns `None` if the watchdog is not enabled.
pub fn spawn_watchdog_task() -> Option<tokio::task::JoinHandle<()>> {
    let timeout_usec = get_watchdog_timeout()?;
    let interval = watchdog_interval(timeout_usec);

    info!(
        "Systemd watchdog enabled, interval: {}s (timeout: {}s)",
        interval.as_secs(),
        timeout_usec / 1_000_000
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify_watchdog() {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}
