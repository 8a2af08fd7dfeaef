//! # Profile Module
//!
//! User choices that survive a restart, stored as JSON:
//!
//! ```json
//! {
//!   "button_map": { "0": "START", "1": "A" },
//!   "selected_port": "COM3",
//!   "selected_game": "F1",
//!   "manual_gear_enabled": false
//! }
//! ```
//!
//! Missing keys take their defaults, so older or hand-edited files still load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::controller::button_map::ButtonMap;
use crate::error::Result;
use crate::telemetry::Game;

/// Persisted user profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Wheel button index → gamepad button
    pub button_map: ButtonMap,

    /// Last used serial port
    pub selected_port: Option<String>,

    /// Last used game
    pub selected_game: Game,

    /// Tap digit keys on shifter gear changes
    pub manual_gear_enabled: bool,
}

impl Profile {
    /// Load a profile from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&contents)?;
        Ok(profile)
    }

    /// Load a profile, falling back to defaults if the file is missing or
    /// unreadable.
    #[must_use]
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No profile at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Ignoring profile {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the profile, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;

        debug!("Saved profile to {}", path.display());
        Ok(())
    }
}
