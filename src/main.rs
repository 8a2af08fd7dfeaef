//! # Sim Race Bridge
//!
//! Bridge a serial sim-racing wheel to a virtual gamepad and feed game
//! telemetry back to it as force feedback.
//!
//! Usage: `sim-race-bridge [config.toml]` (default `config/default.toml`).

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sim_race_bridge::bridge::{BridgeLoop, BridgeSnapshot};
use sim_race_bridge::config::{Config, LoggingConfig};
use sim_race_bridge::controller::sink::connect_sink;
use sim_race_bridge::profile::Profile;
use sim_race_bridge::serial::available_ports;
use sim_race_bridge::serial::port_trait::TokioSerialOpener;

/// Config file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Seconds between status log messages
const STATUS_INTERVAL_SECS: u64 = 10;

/// Main entry point for Sim Race Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load the TOML config and set up logging
///    - Load the JSON profile (port, game, bindings)
///    - Connect the input sink; without one the bridge runs feedback only
///
/// 2. **Bridge**
///    - Spawn the bridge loop (serial ↔ telemetry)
///    - Log a status line every 10 seconds
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the loop, which closes the serial port and telemetry
///      source before exiting
///
/// # Errors
///
/// Returns error if the config file cannot be loaded or fails validation.
#[tokio::main]
async fn main() -> Result<()> {
    let explicit_path = std::env::args().nth(1);
    let config_path = explicit_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = if explicit_path.is_none() && !Path::new(&config_path).exists() {
        Config::default()
    } else {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?
    };

    let _log_guard = init_logging(&config.logging);

    info!("Sim Race Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path);

    let profile = if config.input.profile_path.is_empty() {
        Profile::default()
    } else {
        Profile::load_or_default(&config.input.profile_path)
    };

    if profile.selected_port.is_none() && config.serial.port.is_empty() {
        warn!(
            "No serial port selected. Available ports: {:?}",
            available_ports()
        );
    }

    let sink = match connect_sink(&config.input.sink) {
        Ok(sink) => Some(sink),
        Err(e) => {
            warn!("{}; running in feedback-only mode", e);
            None
        }
    };

    let (bridge, handle) = BridgeLoop::new(&config, Box::new(TokioSerialOpener), sink, profile);
    let bridge = if config.input.profile_path.is_empty() {
        bridge
    } else {
        bridge.with_profile_path(&config.input.profile_path)
    };

    let task = tokio::spawn(bridge.run());

    info!("Press Ctrl+C to exit");

    let mut status_interval = interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    status_interval.tick().await;

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                info!("{}", status_line(&handle.snapshot()));
            }

            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    handle.shutdown();
    task.await.context("Bridge task failed")?;

    Ok(())
}

/// Install the tracing subscriber: stdout always, plus a daily rolling file
/// when `[logging] dir` is set.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if config.dir.is_empty() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Some(guard)
}

/// One-line summary of a bridge snapshot
fn status_line(snapshot: &BridgeSnapshot) -> String {
    format!(
        "Wheel {} on {} | game {} ({}) | gear {} | feedback {}/{} rpm% {}{}",
        snapshot.connection,
        snapshot.port.as_deref().unwrap_or("-"),
        snapshot.game,
        if snapshot.telemetry_active { "live" } else { "idle" },
        snapshot.gear,
        snapshot.feedback.rpm,
        snapshot.feedback.gear_label(),
        snapshot.feedback.rpm_pct,
        if snapshot.feedback_only { " | feedback only" } else { "" }
    )
}
