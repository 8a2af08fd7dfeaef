//! F1 23/24/25 telemetry over UDP.
//!
//! Every packet starts with a 29-byte header (2023+ format):
//!
//! ```text
//! u16 format | u8 year | u8 major | u8 minor | u8 packet version | u8 packet id |
//! u64 session uid | f32 session time | u32 frame id | u32 overall frame id |
//! u8 player car index | u8 secondary player index
//! ```
//!
//! followed by one 60-byte record per car. Only the motion (id 0) and car
//! telemetry (id 6) packets are consumed; the player's record starts at
//! `29 + player_index * 60`.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    bind_addr, finite_or_zero, read_f32_le, read_i8, read_u16_le, read_u8, CurbSide, Game,
    TelemetrySource, UnifiedTelemetryFrame,
};
use crate::config::TelemetryConfig;
use crate::error::{Result, SimBridgeError};

pub const HEADER_SIZE: usize = 29;
pub const CAR_RECORD_SIZE: usize = 60;
pub const PACKET_ID_MOTION: u8 = 0;
pub const PACKET_ID_CAR_TELEMETRY: u8 = 6;

const MAX_PACKET_SIZE: usize = 2048;

// Header offsets
const OFF_FORMAT: usize = 0;
const OFF_GAME_YEAR: usize = 2;
const OFF_PACKET_ID: usize = 6;
const OFF_PLAYER_INDEX: usize = 27;

// Car motion record
const OFF_G_LAT: usize = 36;
const OFF_G_LON: usize = 40;
const OFF_G_VERT: usize = 44;

// Car telemetry record
const OFF_SPEED: usize = 0; // u16 km/h
const OFF_THROTTLE: usize = 2; // f32 0..1
const OFF_STEER: usize = 6; // f32 -1..1
const OFF_BRAKE: usize = 10; // f32 0..1
const OFF_GEAR: usize = 15; // i8
const OFF_RPM: usize = 16; // u16
const OFF_SURFACE_TYPES: usize = 56; // 4 x u8

/// Surface type id of rumble strips
const SURFACE_RUMBLE_STRIP: u8 = 1;

/// Lateral g beyond which the car counts as leaning to one side
pub const CURB_SIDE_DEAD_ZONE: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Motion {
    g_lat: f32,
    g_lon: f32,
    g_vert: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CarTelemetry {
    speed_kmh: f32,
    throttle: f32,
    steer: f32,
    brake: f32,
    gear: i32,
    rpm: u32,
    on_curb: bool,
}

/// Curb side from lateral g.
#[must_use]
pub fn curb_side_from_g(g_lat: f32) -> CurbSide {
    if g_lat < -CURB_SIDE_DEAD_ZONE {
        CurbSide::Left
    } else if g_lat > CURB_SIDE_DEAD_ZONE {
        CurbSide::Right
    } else {
        CurbSide::Center
    }
}

/// Packet decoder with the motion/telemetry carry-over cache.
#[derive(Debug, Default)]
pub struct F1Decoder {
    motion: Option<Motion>,
    telemetry: Option<CarTelemetry>,
    format_logged: bool,
    dropped: u64,
}

impl F1Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Datagrams dropped as short, truncated or malformed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Feed one datagram.
    ///
    /// Returns `Ok(true)` if the cache was updated, `Ok(false)` for packet
    /// types that are not consumed.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPacket` for short datagrams or player records that
    /// fall outside the buffer. The cache is left untouched.
    pub fn ingest(&mut self, data: &[u8]) -> Result<bool> {
        let result = self.decode(data);
        if result.is_err() {
            self.dropped += 1;
        }
        result
    }

    fn decode(&mut self, data: &[u8]) -> Result<bool> {
        if data.len() < HEADER_SIZE {
            return Err(SimBridgeError::UnsupportedPacket(format!(
                "F1 packet too short: {} bytes",
                data.len()
            )));
        }

        let packet_id = read_u8(data, OFF_PACKET_ID).unwrap_or(u8::MAX);
        if packet_id != PACKET_ID_MOTION && packet_id != PACKET_ID_CAR_TELEMETRY {
            return Ok(false);
        }

        if !self.format_logged {
            info!(
                "F1 packets detected (format {}, game year {})",
                read_u16_le(data, OFF_FORMAT).unwrap_or(0),
                read_u8(data, OFF_GAME_YEAR).unwrap_or(0)
            );
            self.format_logged = true;
        }

        let player = usize::from(read_u8(data, OFF_PLAYER_INDEX).unwrap_or(0));
        let start = HEADER_SIZE + player * CAR_RECORD_SIZE;
        let record = data.get(start..start + CAR_RECORD_SIZE).ok_or_else(|| {
            SimBridgeError::UnsupportedPacket(format!(
                "F1 player record {} beyond {} byte packet",
                player,
                data.len()
            ))
        })?;

        let f32_at = |offset| finite_or_zero(read_f32_le(record, offset).unwrap_or(0.0));

        if packet_id == PACKET_ID_MOTION {
            self.motion = Some(Motion {
                g_lat: f32_at(OFF_G_LAT),
                g_lon: f32_at(OFF_G_LON),
                g_vert: f32_at(OFF_G_VERT),
            });
        } else {
            let surfaces = &record[OFF_SURFACE_TYPES..OFF_SURFACE_TYPES + 4];
            self.telemetry = Some(CarTelemetry {
                speed_kmh: f32::from(read_u16_le(record, OFF_SPEED).unwrap_or(0)),
                throttle: f32_at(OFF_THROTTLE),
                steer: f32_at(OFF_STEER),
                brake: f32_at(OFF_BRAKE),
                gear: i32::from(read_i8(record, OFF_GEAR).unwrap_or(0)),
                rpm: u32::from(read_u16_le(record, OFF_RPM).unwrap_or(0)),
                on_curb: surfaces.contains(&SURFACE_RUMBLE_STRIP),
            });
        }

        Ok(true)
    }

    /// Current frame. `None` until a car telemetry packet has been seen.
    #[must_use]
    pub fn frame(&self) -> Option<UnifiedTelemetryFrame> {
        let telemetry = self.telemetry?;
        let motion = self.motion.unwrap_or_default();

        Some(UnifiedTelemetryFrame {
            g_lat: motion.g_lat,
            g_lon: motion.g_lon,
            g_vert: motion.g_vert,
            speed_kmh: telemetry.speed_kmh,
            gear: telemetry.gear,
            rpm: telemetry.rpm,
            on_curb: telemetry.on_curb,
            curb_side: self
                .motion
                .map_or(CurbSide::Unknown, |m| curb_side_from_g(m.g_lat)),
            rumble: 0.0,
            throttle: telemetry.throttle,
            brake: telemetry.brake,
            steer: Some(telemetry.steer),
        })
    }
}

/// F1 UDP telemetry source.
pub struct F1Source {
    addr: SocketAddr,
    socket: Option<UdpSocket>,
    decoder: F1Decoder,
}

impl F1Source {
    #[must_use]
    pub fn new(config: &TelemetryConfig) -> Self {
        Self::with_addr(bind_addr(config, config.f1_port))
    }

    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            socket: None,
            decoder: F1Decoder::new(),
        }
    }

    /// Bound address once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.decoder.dropped()
    }

    fn accept(decoder: &mut F1Decoder, data: &[u8]) {
        if let Err(e) = decoder.ingest(data) {
            debug!("Dropped F1 packet: {}", e);
        }
    }
}

#[async_trait]
impl TelemetrySource for F1Source {
    fn game(&self) -> Game {
        Game::F1
    }

    async fn start(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.addr).await.map_err(|e| {
            SimBridgeError::Transport(format!("cannot bind F1 UDP socket on {}: {}", self.addr, e))
        })?;
        info!("F1 telemetry listening on {}", self.addr);
        self.socket = Some(socket);
        Ok(())
    }

    async fn read_frame(&mut self, budget: Duration) -> Option<UnifiedTelemetryFrame> {
        let socket = self.socket.as_ref()?;
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let deadline = Instant::now() + budget;

        // Wait for the first datagram, then drain what is queued until the deadline
        match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                Self::accept(&mut self.decoder, &buf[..len]);
                while Instant::now() < deadline {
                    match socket.try_recv(&mut buf) {
                        Ok(len) => Self::accept(&mut self.decoder, &buf[..len]),
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!("F1 UDP receive error: {}", e);
                            break;
                        }
                    }
                }
            }
            Ok(Err(e)) => warn!("F1 UDP receive error: {}", e),
            Err(_) => {}
        }

        self.decoder.frame()
    }

    async fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("F1 telemetry closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a packet with a single car record for `player`.
    fn packet(packet_id: u8, player: u8, record: &[u8; CAR_RECORD_SIZE]) -> Vec<u8> {
        let cars = usize::from(player) + 1;
        let mut data = vec![0u8; HEADER_SIZE + cars * CAR_RECORD_SIZE];
        data[0..2].copy_from_slice(&2024u16.to_le_bytes());
        data[OFF_GAME_YEAR] = 24;
        data[OFF_PACKET_ID] = packet_id;
        data[OFF_PLAYER_INDEX] = player;
        let start = HEADER_SIZE + usize::from(player) * CAR_RECORD_SIZE;
        data[start..start + CAR_RECORD_SIZE].copy_from_slice(record);
        data
    }

    fn motion_record(g_lat: f32, g_lon: f32, g_vert: f32) -> [u8; CAR_RECORD_SIZE] {
        let mut record = [0u8; CAR_RECORD_SIZE];
        record[OFF_G_LAT..OFF_G_LAT + 4].copy_from_slice(&g_lat.to_le_bytes());
        record[OFF_G_LON..OFF_G_LON + 4].copy_from_slice(&g_lon.to_le_bytes());
        record[OFF_G_VERT..OFF_G_VERT + 4].copy_from_slice(&g_vert.to_le_bytes());
        record
    }

    fn telemetry_record(speed: u16, gear: i8, rpm: u16, surfaces: [u8; 4]) -> [u8; CAR_RECORD_SIZE] {
        let mut record = [0u8; CAR_RECORD_SIZE];
        record[OFF_SPEED..OFF_SPEED + 2].copy_from_slice(&speed.to_le_bytes());
        record[OFF_THROTTLE..OFF_THROTTLE + 4].copy_from_slice(&0.75f32.to_le_bytes());
        record[OFF_STEER..OFF_STEER + 4].copy_from_slice(&(-0.25f32).to_le_bytes());
        record[OFF_BRAKE..OFF_BRAKE + 4].copy_from_slice(&0.1f32.to_le_bytes());
        record[OFF_GEAR] = gear as u8;
        record[OFF_RPM..OFF_RPM + 2].copy_from_slice(&rpm.to_le_bytes());
        record[OFF_SURFACE_TYPES..OFF_SURFACE_TYPES + 4].copy_from_slice(&surfaces);
        record
    }

    // ==================== Decoder Tests ====================

    #[test]
    fn test_no_frame_before_telemetry_packet() {
        let mut decoder = F1Decoder::new();
        assert!(decoder.frame().is_none());

        assert!(decoder.ingest(&packet(PACKET_ID_MOTION, 0, &motion_record(1.0, 0.0, 1.0))).unwrap());
        assert!(decoder.frame().is_none());
    }

    #[test]
    fn test_gear_and_rpm_pass_through() {
        let mut decoder = F1Decoder::new();
        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(287, 7, 11850, [0; 4])))
            .unwrap();

        let frame = decoder.frame().unwrap();
        assert_eq!(frame.speed_kmh, 287.0);
        assert_eq!(frame.gear, 7);
        assert_eq!(frame.rpm, 11850);
        assert_eq!(frame.throttle, 0.75);
        assert_eq!(frame.brake, 0.1);
        assert_eq!(frame.steer, Some(-0.25));
        assert!(!frame.on_curb);
        assert_eq!(frame.rumble, 0.0);
        assert_eq!(frame.curb_side, CurbSide::Unknown);

        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(3, -1, 900, [0; 4])))
            .unwrap();
        assert_eq!(decoder.frame().unwrap().gear, -1);
    }

    #[test]
    fn test_player_index_selects_record() {
        let mut decoder = F1Decoder::new();
        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 5, &telemetry_record(120, 3, 8000, [0; 4])))
            .unwrap();
        assert_eq!(decoder.frame().unwrap().gear, 3);
    }

    #[test]
    fn test_rumble_strip_surface_sets_on_curb() {
        let mut decoder = F1Decoder::new();
        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(150, 4, 9000, [0, 0, 1, 0])))
            .unwrap();
        assert!(decoder.frame().unwrap().on_curb);
    }

    #[test]
    fn test_curb_side_dead_zone() {
        assert_eq!(curb_side_from_g(-0.6), CurbSide::Left);
        assert_eq!(curb_side_from_g(0.6), CurbSide::Right);
        assert_eq!(curb_side_from_g(0.5), CurbSide::Center);
        assert_eq!(curb_side_from_g(-0.5), CurbSide::Center);
        assert_eq!(curb_side_from_g(0.0), CurbSide::Center);
    }

    #[test]
    fn test_motion_feeds_frame() {
        let mut decoder = F1Decoder::new();
        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(200, 5, 10000, [0; 4])))
            .unwrap();
        decoder
            .ingest(&packet(PACKET_ID_MOTION, 0, &motion_record(-1.2, 0.4, 1.0)))
            .unwrap();

        let frame = decoder.frame().unwrap();
        assert_eq!(frame.g_lat, -1.2);
        assert_eq!(frame.g_lon, 0.4);
        assert_eq!(frame.g_vert, 1.0);
        assert_eq!(frame.curb_side, CurbSide::Left);
    }

    #[test]
    fn test_short_packet_rejected_without_mutation() {
        let mut decoder = F1Decoder::new();
        decoder
            .ingest(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(100, 2, 5000, [0; 4])))
            .unwrap();
        let before = decoder.frame();

        let result = decoder.ingest(&[0u8; HEADER_SIZE - 1]);
        assert!(matches!(result, Err(SimBridgeError::UnsupportedPacket(_))));
        assert_eq!(decoder.frame(), before);
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_truncated_record_rejected() {
        let mut decoder = F1Decoder::new();
        let mut data = packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(100, 2, 5000, [0; 4]));
        data[OFF_PLAYER_INDEX] = 3;

        assert!(decoder.ingest(&data).is_err());
        assert!(decoder.frame().is_none());
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_other_packet_types_ignored() {
        let mut decoder = F1Decoder::new();
        let data = packet(2, 0, &[0u8; CAR_RECORD_SIZE]);
        assert!(!decoder.ingest(&data).unwrap());
        assert_eq!(decoder.dropped(), 0);
    }

    // ==================== Socket Tests ====================

    #[tokio::test]
    async fn test_source_receives_packets() {
        let mut source = F1Source::with_addr("127.0.0.1:0".parse().unwrap());
        source.start().await.unwrap();
        let target = source.local_addr().unwrap();

        // Nothing sent yet
        assert!(source.read_frame(Duration::from_millis(5)).await.is_none());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&packet(PACKET_ID_MOTION, 0, &motion_record(0.8, 0.0, 1.0)), target)
            .await
            .unwrap();
        sender
            .send_to(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(250, 6, 12000, [0; 4])), target)
            .await
            .unwrap();

        let mut frame = None;
        for _ in 0..20 {
            frame = source.read_frame(Duration::from_millis(50)).await;
            if frame.is_some() {
                break;
            }
        }
        let frame = frame.unwrap();
        assert_eq!(frame.gear, 6);
        assert_eq!(frame.rpm, 12000);

        // Cached frame survives a silent poll
        assert_eq!(source.read_frame(Duration::from_millis(1)).await.unwrap().gear, 6);

        source.close().await;
        source.close().await;
        assert!(source.read_frame(Duration::from_millis(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_spent_budget_stops_draining() {
        let mut source = F1Source::with_addr("127.0.0.1:0".parse().unwrap());
        source.start().await.unwrap();
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for gear in [3, 4] {
            sender
                .send_to(&packet(PACKET_ID_CAR_TELEMETRY, 0, &telemetry_record(150, gear, 9000, [0; 4])), target)
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The second packet stays queued for the next poll
        assert_eq!(source.read_frame(Duration::ZERO).await.unwrap().gear, 3);
        assert_eq!(source.read_frame(Duration::ZERO).await.unwrap().gear, 4);
    }

    #[tokio::test]
    async fn test_start_fails_on_bind_conflict() {
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap();

        let mut source = F1Source::with_addr(taken);
        assert!(matches!(source.start().await, Err(SimBridgeError::Transport(_))));
    }
}
