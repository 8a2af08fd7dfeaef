//! # Configuration Module
//!
//! Handles loading and validating bridge tuning from TOML files.
//!
//! Per-user choices (serial port, game, button bindings) live in the JSON
//! profile, see [`crate::profile`].

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SimBridgeError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub shifter: ShifterConfig,
    #[serde(default)]
    pub steering: SteeringConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link and reconnect configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Fallback port when the profile has none (empty = wait for a selection)
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Bounded wait for one controller line
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Empty/invalid reads in a row before the link is dropped
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Cooldown after the failure threshold is reached
    #[serde(default = "default_idle_cooldown_ms")]
    pub idle_cooldown_ms: u64,

    /// Cooldown after an I/O error or device removal
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,

    /// Cooldown after a failed open
    #[serde(default = "default_open_retry_ms")]
    pub open_retry_ms: u64,

    /// Sleep between cycles while no port is selected
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// H-pattern shifter grid calibration.
///
/// The band names describe the default (inverted) wiring where low X values
/// are the right-hand column.
#[derive(Debug, Deserialize, Clone)]
pub struct ShifterConfig {
    #[serde(default = "default_up_max")]
    pub up_max: u8,

    #[serde(default = "default_down_min")]
    pub down_min: u8,

    #[serde(default = "default_right_max")]
    pub right_max: u8,

    #[serde(default = "default_center_min")]
    pub center_min: u8,

    #[serde(default = "default_center_max")]
    pub center_max: u8,

    #[serde(default = "default_left_min")]
    pub left_min: u8,

    #[serde(default = "default_invert_x")]
    pub invert_x: bool,
}

/// Steering axis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SteeringConfig {
    /// Full lock-to-lock rotation in degrees
    #[serde(default = "default_lock_degrees")]
    pub lock_degrees: f32,
}

/// Telemetry source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_f1_port")]
    pub f1_port: u16,

    #[serde(default = "default_forza_port")]
    pub forza_port: u16,

    /// Budget for one telemetry poll inside the bridge cycle
    #[serde(default = "default_poll_budget_ms")]
    pub poll_budget_ms: u64,

    /// Raw Forza gear code that means neutral
    #[serde(default = "default_forza_neutral_gear")]
    pub forza_neutral_gear: u8,

    /// Forza surface rumble → 0..1 scale (approximate)
    #[serde(default = "default_forza_rumble_scale")]
    pub forza_rumble_scale: f32,

    /// File holding the ACC physics page on non-Windows hosts
    #[serde(default = "default_acc_physics_path")]
    pub acc_physics_path: String,

    /// Kerb vibration above which the car counts as on a curb
    #[serde(default = "default_acc_kerb_threshold")]
    pub acc_kerb_threshold: f32,

    /// Stricter kerb vibration tier
    #[serde(default = "default_acc_kerb_strong_threshold")]
    pub acc_kerb_strong_threshold: f32,
}

/// Feedback line configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    /// Rumble byte sent while a wheel is on a curb
    #[serde(default = "default_curb_rumble")]
    pub curb_rumble: u8,

    /// Lateral g → feedback byte gain
    #[serde(default = "default_lateral_gain")]
    pub lateral_gain: f32,
}

/// Input sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// `log` (trace gamepad state) or `none` (feedback-only)
    #[serde(default = "default_sink")]
    pub sink: String,

    /// JSON profile path (empty = no persistence)
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files (empty = stdout only)
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_baud_rate() -> u32 { 115_200 }
fn default_read_timeout_ms() -> u64 { 1000 }
fn default_max_consecutive_failures() -> u32 { 5 }
fn default_idle_cooldown_ms() -> u64 { 3000 }
fn default_error_cooldown_ms() -> u64 { 2000 }
fn default_open_retry_ms() -> u64 { 2000 }
fn default_idle_poll_ms() -> u64 { 500 }

fn default_up_max() -> u8 { 125 }
fn default_down_min() -> u8 { 140 }
fn default_right_max() -> u8 { 104 }
fn default_center_min() -> u8 { 110 }
fn default_center_max() -> u8 { 132 }
fn default_left_min() -> u8 { 138 }
fn default_invert_x() -> bool { true }

fn default_lock_degrees() -> f32 { 180.0 }

fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_f1_port() -> u16 { 20777 }
fn default_forza_port() -> u16 { 5300 }
fn default_poll_budget_ms() -> u64 { 5 }
fn default_forza_neutral_gear() -> u8 { 11 }
fn default_forza_rumble_scale() -> f32 { 0.5 }
fn default_acc_physics_path() -> String { "/dev/shm/acpmf_physics".to_string() }
fn default_acc_kerb_threshold() -> f32 { 0.02 }
fn default_acc_kerb_strong_threshold() -> f32 { 0.05 }

fn default_curb_rumble() -> u8 { 200 }
fn default_lateral_gain() -> f32 { 60.0 }

fn default_sink() -> String { "log".to_string() }
fn default_profile_path() -> String { "sim_race_profile.json".to_string() }

fn default_file_prefix() -> String { "sim-race-bridge.log".to_string() }

/// Baud rates accepted by the wheel firmware
const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115_200, 230_400, 250_000, 500_000, 1_000_000];

/// Input sink kinds
const VALID_SINKS: &[&str] = &["log", "none"];

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            idle_cooldown_ms: default_idle_cooldown_ms(),
            error_cooldown_ms: default_error_cooldown_ms(),
            open_retry_ms: default_open_retry_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for ShifterConfig {
    fn default() -> Self {
        Self {
            up_max: default_up_max(),
            down_min: default_down_min(),
            right_max: default_right_max(),
            center_min: default_center_min(),
            center_max: default_center_max(),
            left_min: default_left_min(),
            invert_x: default_invert_x(),
        }
    }
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self { lock_degrees: default_lock_degrees() }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            f1_port: default_f1_port(),
            forza_port: default_forza_port(),
            poll_budget_ms: default_poll_budget_ms(),
            forza_neutral_gear: default_forza_neutral_gear(),
            forza_rumble_scale: default_forza_rumble_scale(),
            acc_physics_path: default_acc_physics_path(),
            acc_kerb_threshold: default_acc_kerb_threshold(),
            acc_kerb_strong_threshold: default_acc_kerb_strong_threshold(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            curb_rumble: default_curb_rumble(),
            lateral_gain: default_lateral_gain(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            profile_path: default_profile_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn idle_cooldown(&self) -> Duration {
        Duration::from_millis(self.idle_cooldown_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }

    pub fn open_retry(&self) -> Duration {
        Duration::from_millis(self.open_retry_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl TelemetryConfig {
    pub fn poll_budget(&self) -> Duration {
        Duration::from_millis(self.poll_budget_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> SimBridgeError {
    SimBridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sim_race_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial timing
        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 10000 {
            return Err(invalid("read_timeout_ms must be between 1 and 10000"));
        }

        for (name, value) in [
            ("idle_cooldown_ms", self.serial.idle_cooldown_ms),
            ("error_cooldown_ms", self.serial.error_cooldown_ms),
            ("open_retry_ms", self.serial.open_retry_ms),
            ("idle_poll_ms", self.serial.idle_poll_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if self.serial.max_consecutive_failures == 0 {
            return Err(invalid("max_consecutive_failures must be greater than 0"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                VALID_BAUD_RATES
            )));
        }

        // Shifter grid: rows and column bands must not overlap
        let s = &self.shifter;
        if s.up_max >= s.down_min {
            return Err(invalid("shifter up_max must be less than down_min"));
        }
        if !(s.right_max < s.center_min && s.center_min <= s.center_max && s.center_max < s.left_min) {
            return Err(invalid(
                "shifter bands must satisfy right_max < center_min <= center_max < left_min",
            ));
        }

        if !(self.steering.lock_degrees > 0.0 && self.steering.lock_degrees <= 3600.0) {
            return Err(invalid("lock_degrees must be between 0 and 3600"));
        }

        // Telemetry
        let t = &self.telemetry;
        if t.bind_address.parse::<IpAddr>().is_err() {
            return Err(invalid(format!("bind_address {:?} is not an IP address", t.bind_address)));
        }
        if t.f1_port == 0 || t.forza_port == 0 {
            return Err(invalid("telemetry ports must be non-zero"));
        }
        if t.poll_budget_ms == 0 || t.poll_budget_ms > 100 {
            return Err(invalid("poll_budget_ms must be between 1 and 100"));
        }
        if !(t.forza_rumble_scale > 0.0) {
            return Err(invalid("forza_rumble_scale must be greater than 0"));
        }
        if !(t.acc_kerb_threshold >= 0.0 && t.acc_kerb_threshold <= t.acc_kerb_strong_threshold) {
            return Err(invalid(
                "acc kerb thresholds must satisfy 0 <= acc_kerb_threshold <= acc_kerb_strong_threshold",
            ));
        }

        if !(self.feedback.lateral_gain > 0.0) {
            return Err(invalid("lateral_gain must be greater than 0"));
        }

        if !VALID_SINKS.contains(&self.input.sink.as_str()) {
            return Err(invalid(format!("input sink must be one of: {:?}", VALID_SINKS)));
        }

        if !self.logging.dir.is_empty() && self.logging.file_prefix.is_empty() {
            return Err(invalid("file_prefix cannot be empty when a log dir is set"));
        }

        Ok(())
    }
}
