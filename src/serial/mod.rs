//! # Serial Communication Module
//!
//! Owns the serial link to the wheel and its connection lifecycle.
//!
//! This module handles:
//! - Opening the configured port (115200 baud 8N1 by default)
//! - Bounded line reads that pace the bridge loop
//! - Counting empty or invalid reads and backing off after too many
//! - Fixed cooldowns after I/O errors and failed opens
//! - Writing feedback frames only while connected

pub mod port_trait;

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::protocol::decoder::decode_line;
use crate::protocol::wire::ControllerReading;
use port_trait::{SerialLink, SerialOpener};

/// Connection lifecycle as seen by the rest of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Port is open, no valid line received yet
    Connecting,
    /// At least one valid line received since the port was opened
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Outcome of one [`ConnectionManager::poll`] step
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// No port selected
    Idle,
    /// The port could not be opened; retried after the open cooldown
    OpenFailed,
    /// A valid controller line
    Reading(ControllerReading),
    /// Timed out, empty or malformed line
    Missed,
    /// The link was dropped; the next open waits for `cooldown`
    Disconnected { cooldown: Duration },
}

/// Outcome of [`ConnectionManager::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not connected, nothing written
    Skipped,
    /// The write failed and the link was dropped
    Disconnected,
}

/// Serial connection state machine.
///
/// Disconnected → Connecting on a successful open, Connecting → Connected on
/// the first valid line. Any read error, or `max_consecutive_failures` empty
/// or invalid reads in a row, drops back to Disconnected with a cooldown.
pub struct ConnectionManager {
    opener: Box<dyn SerialOpener>,
    link: Option<Box<dyn SerialLink>>,
    config: SerialConfig,
    port: Option<String>,
    state: ConnectionState,
    failures: u32,
    cooldown_until: Option<Instant>,
    last_reading: ControllerReading,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(opener: Box<dyn SerialOpener>, config: SerialConfig) -> Self {
        let port = Some(config.port.clone()).filter(|p| !p.is_empty());
        Self {
            opener,
            link: None,
            config,
            port,
            state: ConnectionState::Disconnected,
            failures: 0,
            cooldown_until: None,
            last_reading: ControllerReading::neutral(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Last valid reading, neutral after any disconnect
    #[must_use]
    pub fn last_reading(&self) -> &ControllerReading {
        &self.last_reading
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Select a different port (or none). Drops the current link without a
    /// cooldown so the new port is tried on the next poll.
    pub fn set_port(&mut self, port: Option<String>) {
        let port = port.filter(|p| !p.is_empty());
        if port == self.port {
            return;
        }
        info!("Serial port changed: {:?} -> {:?}", self.port, port);
        self.close();
        self.port = port;
        self.cooldown_until = None;
    }

    /// Run one step: wait out any cooldown, open if needed, read one line.
    ///
    /// Sleeps for at most the cooldown plus `read_timeout`, so callers may
    /// cancel it at any point. A partially received line survives.
    pub async fn poll(&mut self) -> LinkEvent {
        let Some(port) = self.port.clone() else {
            tokio::time::sleep(self.config.idle_poll()).await;
            return LinkEvent::Idle;
        };

        if let Some(until) = self.cooldown_until {
            tokio::time::sleep_until(until).await;
            self.cooldown_until = None;
        }

        if self.link.is_none() {
            match self.opener.open(&port, self.config.baud_rate).await {
                Ok(link) => {
                    info!("Opened serial port {} at {} baud", port, self.config.baud_rate);
                    self.link = Some(link);
                    self.state = ConnectionState::Connecting;
                    self.failures = 0;
                }
                Err(e) => {
                    warn!("Failed to open serial port {}: {}", port, e);
                    self.state = ConnectionState::Disconnected;
                    self.cooldown_until = Some(Instant::now() + self.config.open_retry());
                    return LinkEvent::OpenFailed;
                }
            }
        }

        let timeout = self.config.read_timeout();
        let Some(link) = self.link.as_mut() else {
            return LinkEvent::Missed;
        };

        match link.read_line(timeout).await {
            Ok(Some(line)) => match decode_line(&line) {
                Ok(reading) => {
                    if self.state != ConnectionState::Connected {
                        info!("Controller connected on {}", port);
                    }
                    self.state = ConnectionState::Connected;
                    self.failures = 0;
                    self.last_reading = reading.clone();
                    LinkEvent::Reading(reading)
                }
                Err(e) => {
                    debug!("Dropping line: {}", e);
                    self.record_failure()
                }
            },
            Ok(None) => self.record_failure(),
            Err(e) => {
                warn!("Serial read failed on {}: {}", port, e);
                let cooldown = self.config.error_cooldown();
                self.disconnect(cooldown);
                LinkEvent::Disconnected { cooldown }
            }
        }
    }

    /// Write one frame if connected.
    pub async fn send(&mut self, data: &[u8]) -> SendOutcome {
        if self.state != ConnectionState::Connected {
            return SendOutcome::Skipped;
        }
        let Some(link) = self.link.as_mut() else {
            return SendOutcome::Skipped;
        };

        match link.write_all(data).await {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                warn!("Serial write failed: {}", e);
                self.disconnect(self.config.error_cooldown());
                SendOutcome::Disconnected
            }
        }
    }

    /// Drop the link without scheduling a cooldown.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            info!("Closed serial port {}", self.port.as_deref().unwrap_or("-"));
        }
        self.reset();
    }

    fn record_failure(&mut self) -> LinkEvent {
        self.failures += 1;
        if self.failures >= self.config.max_consecutive_failures {
            warn!(
                "No valid data after {} reads, backing off",
                self.failures
            );
            let cooldown = self.config.idle_cooldown();
            self.disconnect(cooldown);
            LinkEvent::Disconnected { cooldown }
        } else {
            LinkEvent::Missed
        }
    }

    fn disconnect(&mut self, cooldown: Duration) {
        self.link = None;
        self.reset();
        self.cooldown_until = Some(Instant::now() + cooldown);
        debug!("Serial cooldown {:?}", cooldown);
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.failures = 0;
        self.last_reading = ControllerReading::neutral();
    }
}

/// Names of serial ports present on this machine
#[must_use]
pub fn available_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}
