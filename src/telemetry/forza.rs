//! Forza Motorsport / Forza Horizon "Data Out" telemetry over UDP.
//!
//! Packets are a single little-endian record. The first 232 bytes ("sled")
//! carry the physics state; the dashboard fields follow. Forza Horizon
//! inserts 12 bytes in front of the dashboard block, so its gear, pedal and
//! steering bytes sit 12 bytes later than in Forza Motorsport.
//!
//! Only the newest datagram of each poll is decoded.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    bind_addr, finite_or_zero, read_f32_le, read_i32_le, read_i8, read_u8, Game,
    TelemetrySource, UnifiedTelemetryFrame,
};
use crate::config::TelemetryConfig;
use crate::error::{Result, SimBridgeError};

/// Forza Motorsport dash packet
pub const FM_DASH_SIZE: usize = 311;
/// Forza Motorsport (2023) dash packet with trailing tire wear fields
pub const FM_EXTENDED_SIZE: usize = 331;
/// Forza Horizon dash packet
pub const FH_DASH_SIZE: usize = 324;
/// Dashboard block shift in Forza Horizon packets
pub const FH_DASH_SHIFT: usize = 12;

const MAX_PACKET_SIZE: usize = 512;

/// Standard gravity (m/s²)
const G: f32 = 9.806_65;
const MS_TO_KMH: f32 = 3.6;

// ── Sled offsets ────────────────────────────────────────────────────────────
const OFF_IS_RACE_ON: usize = 0; // i32
const OFF_CURRENT_RPM: usize = 16; // f32
const OFF_ACCEL_X: usize = 20; // f32, lateral
const OFF_ACCEL_Y: usize = 24; // f32, vertical
const OFF_ACCEL_Z: usize = 28; // f32, longitudinal
const OFF_VEL_X: usize = 32; // f32
const OFF_VEL_Y: usize = 36; // f32
const OFF_VEL_Z: usize = 40; // f32
const OFF_WHEEL_ON_RUMBLE: usize = 116; // 4 x i32 (FL, FR, RL, RR)
const OFF_SURFACE_RUMBLE: usize = 148; // 4 x f32 (FL, FR, RL, RR)

// ── Dash offsets (Forza Motorsport) ─────────────────────────────────────────
const OFF_DASH_ACCEL: usize = 303; // u8
const OFF_DASH_BRAKE: usize = 304; // u8
const OFF_DASH_GEAR: usize = 307; // u8
const OFF_DASH_STEER: usize = 308; // i8

/// Record layout, picked from the datagram length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForzaFormat {
    Motorsport,
    Horizon,
}

impl ForzaFormat {
    #[must_use]
    pub fn detect(len: usize) -> Option<Self> {
        match len {
            FM_DASH_SIZE | FM_EXTENDED_SIZE => Some(ForzaFormat::Motorsport),
            FH_DASH_SIZE => Some(ForzaFormat::Horizon),
            _ => None,
        }
    }

    fn dash_shift(&self) -> usize {
        match self {
            ForzaFormat::Motorsport => 0,
            ForzaFormat::Horizon => FH_DASH_SHIFT,
        }
    }
}

/// Map a raw gear byte: 0 is reverse, `neutral` is neutral, anything else
/// is the forward gear as sent.
#[must_use]
pub fn remap_gear(raw: u8, neutral: u8) -> i32 {
    match raw {
        0 => -1,
        g if g == neutral => 0,
        g => i32::from(g),
    }
}

/// Stateless record decoder with per-deployment calibration.
#[derive(Debug, Clone)]
pub struct ForzaDecoder {
    neutral_gear: u8,
    rumble_scale: f32,
}

impl Default for ForzaDecoder {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

impl ForzaDecoder {
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            neutral_gear: config.forza_neutral_gear,
            rumble_scale: config.forza_rumble_scale,
        }
    }

    /// Decode one datagram.
    ///
    /// Returns `Ok(None)` while the game is paused or in menus.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPacket` for datagram lengths that match no known
    /// layout.
    pub fn decode(&self, data: &[u8]) -> Result<Option<UnifiedTelemetryFrame>> {
        let format = ForzaFormat::detect(data.len()).ok_or_else(|| {
            SimBridgeError::UnsupportedPacket(format!("Forza packet of {} bytes", data.len()))
        })?;

        if read_i32_le(data, OFF_IS_RACE_ON).unwrap_or(0) == 0 {
            return Ok(None);
        }

        let f32_at = |offset| finite_or_zero(read_f32_le(data, offset).unwrap_or(0.0));
        let shift = format.dash_shift();

        let vel = [f32_at(OFF_VEL_X), f32_at(OFF_VEL_Y), f32_at(OFF_VEL_Z)];
        let speed_ms = (vel[0] * vel[0] + vel[1] * vel[1] + vel[2] * vel[2]).sqrt();

        let on_curb = (0..4).any(|wheel| {
            read_i32_le(data, OFF_WHEEL_ON_RUMBLE + wheel * 4).unwrap_or(0) != 0
        });

        // Front wheels drive the rumble; the scale is approximate
        let surface_fl = f32_at(OFF_SURFACE_RUMBLE);
        let surface_fr = f32_at(OFF_SURFACE_RUMBLE + 4);
        let rumble = (surface_fl.max(surface_fr) * self.rumble_scale).clamp(0.0, 1.0);

        let byte_at = |offset| read_u8(data, offset + shift).unwrap_or(0);
        let steer = read_i8(data, OFF_DASH_STEER + shift).unwrap_or(0);

        Ok(Some(UnifiedTelemetryFrame {
            g_lat: f32_at(OFF_ACCEL_X) / G,
            g_lon: f32_at(OFF_ACCEL_Z) / G,
            g_vert: f32_at(OFF_ACCEL_Y) / G,
            speed_kmh: speed_ms * MS_TO_KMH,
            gear: remap_gear(byte_at(OFF_DASH_GEAR), self.neutral_gear),
            rpm: f32_at(OFF_CURRENT_RPM).max(0.0) as u32,
            on_curb,
            rumble,
            throttle: f32::from(byte_at(OFF_DASH_ACCEL)) / 255.0,
            brake: f32::from(byte_at(OFF_DASH_BRAKE)) / 255.0,
            steer: Some((f32::from(steer) / 127.0).clamp(-1.0, 1.0)),
            ..UnifiedTelemetryFrame::default()
        }))
    }
}

/// Forza UDP telemetry source.
pub struct ForzaSource {
    addr: SocketAddr,
    socket: Option<UdpSocket>,
    decoder: ForzaDecoder,
    last: Option<UnifiedTelemetryFrame>,
    dropped: u64,
}

impl ForzaSource {
    #[must_use]
    pub fn new(config: &TelemetryConfig) -> Self {
        Self::with_addr(bind_addr(config, config.forza_port), ForzaDecoder::from_config(config))
    }

    #[must_use]
    pub fn with_addr(addr: SocketAddr, decoder: ForzaDecoder) -> Self {
        Self {
            addr,
            socket: None,
            decoder,
            last: None,
            dropped: 0,
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Datagrams dropped as unsupported.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl TelemetrySource for ForzaSource {
    fn game(&self) -> Game {
        Game::Forza
    }

    async fn start(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.addr).await.map_err(|e| {
            SimBridgeError::Transport(format!(
                "cannot bind Forza UDP socket on {}: {}",
                self.addr, e
            ))
        })?;
        info!("Forza telemetry listening on {}", self.addr);
        self.socket = Some(socket);
        Ok(())
    }

    async fn read_frame(&mut self, budget: Duration) -> Option<UnifiedTelemetryFrame> {
        let socket = self.socket.as_ref()?;
        let mut latest = [0u8; MAX_PACKET_SIZE];
        let mut scratch = [0u8; MAX_PACKET_SIZE];

        let deadline = Instant::now() + budget;

        let mut latest_len =
            match tokio::time::timeout_at(deadline, socket.recv(&mut latest)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!("Forza UDP receive error: {}", e);
                    return self.last;
                }
                Err(_) => return self.last,
            };

        // Anything already queued is newer
        while Instant::now() < deadline {
            match socket.try_recv(&mut scratch) {
                Ok(len) => {
                    latest[..len].copy_from_slice(&scratch[..len]);
                    latest_len = len;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Forza UDP receive error: {}", e);
                    break;
                }
            }
        }

        match self.decoder.decode(&latest[..latest_len]) {
            Ok(frame) => self.last = frame,
            Err(e) => {
                self.dropped += 1;
                debug!("Dropped Forza packet: {}", e);
            }
        }
        self.last
    }

    async fn close(&mut self) {
        self.last = None;
        if self.socket.take().is_some() {
            info!("Forza telemetry closed");
        }
    }
}
