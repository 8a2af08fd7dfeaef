//! # Telemetry Module
//!
//! Game telemetry sources normalized into one [`UnifiedTelemetryFrame`].
//!
//! This module handles:
//! - F1 23/24/25 UDP packets ([`f1`])
//! - Forza Motorsport / Horizon "Data Out" UDP packets ([`forza`])
//! - Assetto Corsa Competizione physics shared memory ([`acc`])
//!
//! Every source implements [`TelemetrySource`]. Malformed or unsupported
//! packets are dropped; they never reach the bridge as errors.

pub mod acc;
pub mod f1;
pub mod forza;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::config::TelemetryConfig;
use crate::error::{Result, SimBridgeError};

/// Which wheels-on-curb side the car leans to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurbSide {
    Left,
    Right,
    Center,
    #[default]
    Unknown,
}

/// Source-agnostic telemetry snapshot.
///
/// Fields a source cannot derive keep their defaults: zero forces, neutral
/// gear, `CurbSide::Unknown`, no steering.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnifiedTelemetryFrame {
    /// Lateral g-force (positive = right)
    pub g_lat: f32,
    /// Longitudinal g-force
    pub g_lon: f32,
    /// Vertical g-force
    pub g_vert: f32,
    /// Speed in km/h
    pub speed_kmh: f32,
    /// -1 = reverse, 0 = neutral, 1.. = forward
    pub gear: i32,
    pub rpm: u32,
    pub on_curb: bool,
    pub curb_side: CurbSide,
    /// Ambient rumble intensity, nominally 0..1
    pub rumble: f32,
    /// Throttle pedal 0..1
    pub throttle: f32,
    /// Brake pedal 0..1
    pub brake: f32,
    /// Steering -1..1 when the game reports it
    pub steer: Option<f32>,
}

/// Supported games
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Game {
    /// No telemetry
    #[default]
    None,
    F1,
    Forza,
    Acc,
}

impl Game {
    pub const ALL: [Game; 4] = [Game::None, Game::F1, Game::Forza, Game::Acc];

    /// Redline used for the RPM percentage field.
    #[must_use]
    pub fn max_rpm(&self) -> u32 {
        match self {
            Game::F1 => 13500,
            Game::Acc => 9000,
            Game::Forza => 8000,
            Game::None => 10000,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Game::None => "NONE",
            Game::F1 => "F1",
            Game::Forza => "FORZA",
            Game::Acc => "ACC",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Game {
    type Err = SimBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Game::ALL
            .iter()
            .copied()
            .find(|game| game.name() == wanted)
            .ok_or_else(|| SimBridgeError::InvalidValue(format!("unknown game {:?}", s)))
    }
}

/// A game telemetry transport.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Game this source decodes.
    fn game(&self) -> Game;

    /// Acquire the transport (bind the socket, open the shared memory).
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be acquired.
    async fn start(&mut self) -> Result<()>;

    /// Poll for at most `budget` and return the freshest frame, if any.
    async fn read_frame(&mut self, budget: Duration) -> Option<UnifiedTelemetryFrame>;

    /// Release the transport. Safe to call more than once.
    async fn close(&mut self);
}

/// Build the source for `game` (`None` for [`Game::None`]). Not started.
#[must_use]
pub fn open_source(game: Game, config: &TelemetryConfig) -> Option<Box<dyn TelemetrySource>> {
    match game {
        Game::None => None,
        Game::F1 => Some(Box::new(f1::F1Source::new(config))),
        Game::Forza => Some(Box::new(forza::ForzaSource::new(config))),
        Game::Acc => Some(Box::new(acc::AccSource::new(config))),
    }
}

/// Build and start the source for `game`.
///
/// # Errors
///
/// Propagates the source's `start()` failure.
pub async fn start_source(
    game: Game,
    config: &TelemetryConfig,
) -> Result<Option<Box<dyn TelemetrySource>>> {
    match open_source(game, config) {
        Some(mut source) => {
            source.start().await?;
            Ok(Some(source))
        }
        None => Ok(None),
    }
}

/// Socket address for a UDP source. An unparsable bind address falls back
/// to all interfaces.
pub(crate) fn bind_addr(config: &TelemetryConfig, port: u16) -> SocketAddr {
    let ip = config
        .bind_address
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    SocketAddr::new(ip, port)
}

// Little-endian field readers. Out-of-range reads yield `None`.

pub(crate) fn read_u8(data: &[u8], offset: usize) -> Option<u8> {
    data.get(offset).copied()
}

pub(crate) fn read_i8(data: &[u8], offset: usize) -> Option<i8> {
    data.get(offset).map(|&b| b as i8)
}

pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u16::from_le_bytes)
}

pub(crate) fn read_i32_le(data: &[u8], offset: usize) -> Option<i32> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i32::from_le_bytes)
}

pub(crate) fn read_f32_le(data: &[u8], offset: usize) -> Option<f32> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(f32::from_le_bytes)
}

/// Replace NaN/infinite values with zero.
pub(crate) fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_max_rpm() {
        assert_eq!(Game::F1.max_rpm(), 13500);
        assert_eq!(Game::Acc.max_rpm(), 9000);
        assert_eq!(Game::Forza.max_rpm(), 8000);
        assert_eq!(Game::None.max_rpm(), 10000);
    }

    #[test]
    fn test_game_names() {
        for game in Game::ALL {
            assert_eq!(game.to_string().parse::<Game>().unwrap(), game);
        }
        assert_eq!("forza".parse::<Game>().unwrap(), Game::Forza);
        assert!("iracing".parse::<Game>().is_err());
        assert_eq!(serde_json::to_string(&Game::Acc).unwrap(), "\"ACC\"");
    }

    #[test]
    fn test_default_frame() {
        let frame = UnifiedTelemetryFrame::default();
        assert_eq!(frame.gear, 0);
        assert_eq!(frame.curb_side, CurbSide::Unknown);
        assert!(frame.steer.is_none());
    }

    #[test]
    fn test_readers_bounds() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x80, 0x3F];
        assert_eq!(read_u8(&data, 0), Some(1));
        assert_eq!(read_u16_le(&data, 0), Some(0x0201));
        assert_eq!(read_f32_le(&data, 2), Some(1.0));
        assert_eq!(read_i8(&[0xFF], 0), Some(-1));
        assert_eq!(read_i32_le(&data, 4), None);
        assert_eq!(read_u8(&data, 6), None);
    }

    #[test]
    fn test_open_source_per_game() {
        let config = TelemetryConfig::default();
        assert!(open_source(Game::None, &config).is_none());
        for game in [Game::F1, Game::Forza, Game::Acc] {
            let source = open_source(game, &config).unwrap();
            assert_eq!(source.game(), game);
        }
    }

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(1.5), 1.5);
        assert_eq!(finite_or_zero(f32::NAN), 0.0);
        assert_eq!(finite_or_zero(f32::INFINITY), 0.0);
    }
}
