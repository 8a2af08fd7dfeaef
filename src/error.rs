//! # Error Types
//!
//! Custom error types for Sim Race Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Sim Race Bridge
#[derive(Debug, Error)]
pub enum SimBridgeError {
    /// Controller line did not match the wire grammar
    #[error("Malformed controller line: {0}")]
    MalformedLine(String),

    /// Serial or socket I/O failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Telemetry datagram too short, wrong type or otherwise not decodable
    #[error("Unsupported telemetry packet: {0}")]
    UnsupportedPacket(String),

    /// Virtual gamepad / keyboard driver is missing
    #[error("Input driver unavailable: {0}")]
    DriverUnavailable(String),

    /// The selected serial port could not be opened
    #[error("Cannot open serial port {0}")]
    SerialPortNotFound(String),

    /// Unknown game, gamepad button or binding index
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Command sent after the bridge loop exited
    #[error("Bridge is not running")]
    BridgeStopped,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Profile (JSON) errors
    #[error("Profile error: {0}")]
    Profile(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sim Race Bridge
pub type Result<T> = std::result::Result<T, SimBridgeError>;
