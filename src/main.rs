//! Battery statistics daemon.
//!
//! Watches the system battery through UPower and the systemd sleep hook
//! signal, and prints one human-readable power-consumption report line per
//! event: instantaneous rate, average rate over the current charge or
//! discharge cycle, and energy consumed across sleep intervals.

mod config;
mod error;
mod event;
mod logging;
mod rate;
mod report;
mod sleep;
mod stats;
mod upower;

use config::Config;
use error::{DaemonError, DiscoveryError};
use stats::BatteryStats;
use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::Connection;

/// Reducer inbox depth; both producers block when the reducer lags this far.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Graceful shutdown timeout in seconds
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(&Config::default_path()).map_err(DaemonError::Config)?;

    let _log_guard = logging::init_logging(config.log_dir.as_deref()).map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        e
    })?;

    info!("battery-stats daemon starting...");

    let result = run_daemon(config).await;

    match &result {
        Ok(()) => info!("battery-stats daemon shut down gracefully"),
        Err(e) => error!("battery-stats daemon error: {}", e),
    }

    result.map_err(Into::into)
}

async fn run_daemon(config: Config) -> Result<(), DaemonError> {
    let conn = Connection::system().await?;

    let device_path = match resolve_battery(&config, &conn).await? {
        Some(path) => path,
        // Graceful exit: nothing to monitor on this machine.
        None => return Ok(()),
    };
    info!(device = %device_path, "monitoring battery device");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_shutdown_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = setup_signal_handlers(signal_shutdown_tx).await {
            error!("Signal handler error: {}", e);
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    // Producer tasks: a transport failure in either one is fatal for the
    // daemon, per the no-reconnection design.
    let sleep_conn = conn.clone();
    let sleep_tx = event_tx.clone();
    let sleep_shutdown_rx = shutdown_rx.clone();
    let sleep_fail_tx = shutdown_tx.clone();
    let sleep_handle = tokio::spawn(async move {
        if let Err(e) = sleep::run_sleep_monitor(sleep_conn, sleep_tx, sleep_shutdown_rx).await {
            error!("sleep monitor failed: {}", e);
            let _ = sleep_fail_tx.send(true);
        }
    });

    let battery_shutdown_rx = shutdown_rx.clone();
    let battery_fail_tx = shutdown_tx.clone();
    let battery_handle = tokio::spawn(async move {
        if let Err(e) =
            upower::run_battery_monitor(conn, device_path, event_tx, battery_shutdown_rx).await
        {
            error!("battery monitor failed: {}", e);
            let _ = battery_fail_tx.send(true);
        }
    });

    info!("battery-stats daemon initialized and running");

    // Single-threaded reducer: all accounting state lives here, and every
    // event is handled to completion before the next one is taken.
    let mut engine = BatteryStats::new(io::stdout());
    let mut shutdown_rx_main = shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = shutdown_rx_main.changed() => {
                if *shutdown_rx_main.borrow() {
                    info!("shutdown signal received, stopping tasks...");
                    break;
                }
            }
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => engine.handle_event(&event)?,
                    None => break,
                }
            }
        }
    }

    let shutdown_timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(sleep_handle, battery_handle);
    })
    .await;

    info!("all tasks stopped");
    Ok(())
}

/// Resolve the battery device path: either the configured override, or
/// discovery on the bus. Returns `None` for the graceful no-battery exit;
/// multiple batteries are fatal. Both outcomes are reported on stdout.
async fn resolve_battery(
    config: &Config,
    conn: &Connection,
) -> Result<Option<OwnedObjectPath>, DaemonError> {
    if let Some(path) = &config.device_path {
        let path = ObjectPath::try_from(path.as_str()).map_err(zbus::Error::from)?;
        return Ok(Some(path.into()));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match upower::find_battery(conn, &mut out).await {
        Ok(path) => Ok(Some(path)),
        Err(DiscoveryError::NoBattery) => {
            writeln!(out, "No battery found").map_err(DiscoveryError::Io)?;
            Ok(None)
        }
        Err(e @ DiscoveryError::MultipleBatteries { .. }) => {
            writeln!(out, "Multiple batteries not supported").map_err(DiscoveryError::Io)?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Set up signal handlers for graceful shutdown.
/// Handles SIGTERM and SIGINT.
#[cfg(unix)]
async fn setup_signal_handlers(
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Stub signal handler for non-Unix platforms
#[cfg(not(unix))]
async fn setup_signal_handlers(
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    let _ = shutdown_tx.send(true);
    Ok(())
}
