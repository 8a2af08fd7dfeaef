//! Assetto Corsa Competizione physics page.
//!
//! ACC publishes its physics state in the named file mapping
//! `Local\acpmf_physics`. The page is a snapshot that the game overwrites in
//! place, so every poll re-reads it; there is no queue to drain.
//!
//! On Windows the mapping is opened directly. Elsewhere the page is read
//! from a file holding a copy of it (for example a `/dev/shm` bridge fed by a
//! helper on the game host).

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::{finite_or_zero, read_f32_le, read_i32_le, Game, TelemetrySource, UnifiedTelemetryFrame};
use crate::config::TelemetryConfig;
use crate::error::{Result, SimBridgeError};

/// Bytes of the physics page that are decoded
pub const PHYSICS_PAGE_SIZE: usize = 800;

/// Name of the physics file mapping
pub const PHYSICS_MAP_NAME: &str = "Local\\acpmf_physics";

/// Upper bound of the idle sleep when the physics page is absent
pub const ABSENT_SLEEP_CAP: Duration = Duration::from_millis(10);

const OFF_PACKET_ID: usize = 0; // i32, 0 until the game writes physics
const OFF_GAS: usize = 4; // f32 0..1
const OFF_BRAKE: usize = 8; // f32 0..1
const OFF_GEAR: usize = 16; // i32, 0 = R, 1 = N, 2 = 1st
const OFF_RPMS: usize = 20; // i32
const OFF_STEER_ANGLE: usize = 24; // f32 -1..1
const OFF_SPEED_KMH: usize = 28; // f32
const OFF_ACC_G_X: usize = 44; // f32 lateral
const OFF_ACC_G_Y: usize = 48; // f32 longitudinal
const OFF_ACC_G_Z: usize = 52; // f32 vertical
const OFF_KERB_VIBRATION: usize = 784; // f32
const OFF_SLIP_VIBRATION: usize = 788; // f32
const OFF_G_VIBRATION: usize = 792; // f32
const OFF_ABS_VIBRATION: usize = 796; // f32

// Vibration channel weights of the rumble mix
const KERB_WEIGHT: f32 = 1.0;
const SLIP_WEIGHT: f32 = 0.5;
const G_WEIGHT: f32 = 0.2;
const ABS_WEIGHT: f32 = 0.8;

/// Read access to the physics page.
pub trait PhysicsPage: Send {
    /// Copy the current page into `buf`.
    ///
    /// Returns `false` when the page is currently unavailable.
    fn read(&mut self, buf: &mut [u8; PHYSICS_PAGE_SIZE]) -> bool;
}

/// Physics page kept in a regular file.
#[derive(Debug)]
pub struct FilePage {
    path: PathBuf,
}

impl FilePage {
    /// Open the page file.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(SimBridgeError::Transport(format!(
                "ACC physics page {} not found",
                path.display()
            )));
        }
        Ok(Self { path })
    }
}

impl PhysicsPage for FilePage {
    fn read(&mut self, buf: &mut [u8; PHYSICS_PAGE_SIZE]) -> bool {
        match std::fs::read(&self.path) {
            Ok(data) if data.len() >= PHYSICS_PAGE_SIZE => {
                buf.copy_from_slice(&data[..PHYSICS_PAGE_SIZE]);
                true
            }
            Ok(data) => {
                debug!("ACC physics page truncated: {} bytes", data.len());
                false
            }
            Err(e) => {
                debug!("ACC physics page unreadable: {}", e);
                false
            }
        }
    }
}

#[cfg(windows)]
mod mapping {
    use super::{PhysicsPage, PHYSICS_MAP_NAME, PHYSICS_PAGE_SIZE};
    use crate::error::{Result, SimBridgeError};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::{
        handleapi::{CloseHandle, INVALID_HANDLE_VALUE},
        memoryapi::{MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ},
        winnt::HANDLE,
    };

    /// Read-only view of the `Local\acpmf_physics` mapping.
    pub struct MappedPage {
        handle: HANDLE,
        base_ptr: *const u8,
    }

    // The view is read-only and only touched through `&mut self`
    unsafe impl Send for MappedPage {}

    impl MappedPage {
        pub fn open() -> Result<Self> {
            let name_wide: Vec<u16> = OsStr::new(PHYSICS_MAP_NAME)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            // SAFETY: name_wide is NUL terminated and outlives the call; the
            // view is unmapped and the handle closed in Drop.
            unsafe {
                let handle = OpenFileMappingW(FILE_MAP_READ, 0, name_wide.as_ptr());
                if handle == INVALID_HANDLE_VALUE || handle.is_null() {
                    return Err(SimBridgeError::Transport(format!(
                        "cannot open {} (is ACC running?)",
                        PHYSICS_MAP_NAME
                    )));
                }

                let base_ptr = MapViewOfFile(handle, FILE_MAP_READ, 0, 0, PHYSICS_PAGE_SIZE) as *const u8;
                if base_ptr.is_null() {
                    CloseHandle(handle);
                    return Err(SimBridgeError::Transport(format!(
                        "cannot map {}",
                        PHYSICS_MAP_NAME
                    )));
                }

                Ok(Self { handle, base_ptr })
            }
        }
    }

    impl PhysicsPage for MappedPage {
        fn read(&mut self, buf: &mut [u8; PHYSICS_PAGE_SIZE]) -> bool {
            // SAFETY: the view spans PHYSICS_PAGE_SIZE readable bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(self.base_ptr, buf.as_mut_ptr(), PHYSICS_PAGE_SIZE);
            }
            true
        }
    }

    impl Drop for MappedPage {
        fn drop(&mut self) {
            // SAFETY: both were obtained in `open` and are released once.
            unsafe {
                UnmapViewOfFile(self.base_ptr as *mut _);
                CloseHandle(self.handle);
            }
        }
    }
}

/// Physics page decoder.
#[derive(Debug, Clone, Copy)]
pub struct AccDecoder {
    kerb_threshold: f32,
    kerb_strong_threshold: f32,
}

impl Default for AccDecoder {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

impl AccDecoder {
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            kerb_threshold: config.acc_kerb_threshold,
            kerb_strong_threshold: config.acc_kerb_strong_threshold,
        }
    }

    /// Decode a page. `None` while the game has not written physics yet.
    #[must_use]
    pub fn decode(&self, page: &[u8; PHYSICS_PAGE_SIZE]) -> Option<UnifiedTelemetryFrame> {
        if read_i32_le(page, OFF_PACKET_ID).unwrap_or(0) == 0 {
            return None;
        }

        let f32_at = |offset| finite_or_zero(read_f32_le(page, offset).unwrap_or(0.0));

        let kerb = f32_at(OFF_KERB_VIBRATION);
        let rumble = kerb * KERB_WEIGHT
            + f32_at(OFF_SLIP_VIBRATION) * SLIP_WEIGHT
            + f32_at(OFF_G_VIBRATION) * G_WEIGHT
            + f32_at(OFF_ABS_VIBRATION) * ABS_WEIGHT;

        let on_curb = kerb > self.kerb_threshold || kerb > self.kerb_strong_threshold;

        Some(UnifiedTelemetryFrame {
            g_lat: f32_at(OFF_ACC_G_X),
            g_lon: f32_at(OFF_ACC_G_Y),
            g_vert: f32_at(OFF_ACC_G_Z),
            speed_kmh: f32_at(OFF_SPEED_KMH).max(0.0),
            gear: read_i32_le(page, OFF_GEAR).unwrap_or(1) - 1,
            rpm: read_i32_le(page, OFF_RPMS).unwrap_or(0).max(0) as u32,
            on_curb,
            rumble,
            throttle: f32_at(OFF_GAS),
            brake: f32_at(OFF_BRAKE),
            steer: Some(f32_at(OFF_STEER_ANGLE)),
            ..UnifiedTelemetryFrame::default()
        })
    }
}

/// ACC shared memory telemetry source.
pub struct AccSource {
    path: PathBuf,
    decoder: AccDecoder,
    page: Option<Box<dyn PhysicsPage>>,
    buf: Box<[u8; PHYSICS_PAGE_SIZE]>,
}

impl AccSource {
    #[must_use]
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            path: PathBuf::from(&config.acc_physics_path),
            decoder: AccDecoder::from_config(config),
            page: None,
            buf: Box::new([0u8; PHYSICS_PAGE_SIZE]),
        }
    }

    /// Source reading from an already opened page.
    #[must_use]
    pub fn with_page(page: Box<dyn PhysicsPage>, decoder: AccDecoder) -> Self {
        Self {
            path: PathBuf::new(),
            decoder,
            page: Some(page),
            buf: Box::new([0u8; PHYSICS_PAGE_SIZE]),
        }
    }

    #[cfg(windows)]
    fn open_page(&self) -> Result<Box<dyn PhysicsPage>> {
        Ok(Box::new(mapping::MappedPage::open()?))
    }

    #[cfg(not(windows))]
    fn open_page(&self) -> Result<Box<dyn PhysicsPage>> {
        Ok(Box::new(FilePage::open(&self.path)?))
    }
}

#[async_trait]
impl TelemetrySource for AccSource {
    fn game(&self) -> Game {
        Game::Acc
    }

    async fn start(&mut self) -> Result<()> {
        if self.page.is_none() {
            self.page = Some(self.open_page()?);
            info!("ACC physics page opened");
        }
        Ok(())
    }

    async fn read_frame(&mut self, budget: Duration) -> Option<UnifiedTelemetryFrame> {
        let page = self.page.as_mut()?;

        let frame = if page.read(&mut self.buf) {
            self.decoder.decode(&self.buf)
        } else {
            None
        };

        if frame.is_none() && !budget.is_zero() {
            tokio::time::sleep(budget.min(ABSENT_SLEEP_CAP)).await;
        }
        frame
    }

    async fn close(&mut self) {
        if self.page.take().is_some() {
            info!("ACC physics page closed");
        }
    }
}
