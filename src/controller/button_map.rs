//! # Button Map Module
//!
//! Maps wheel button indices to virtual gamepad buttons.
//!
//! ## Default Assignments
//!
//! | Index | Button |
//! |-------|--------|
//! | 0 | START |
//! | 1 | A |
//! | 2 | X |
//! | 3 | DPAD_RIGHT |
//! | 4 | DPAD_LEFT |
//! | 5 | DPAD_UP |
//! | 6 | DPAD_DOWN |
//! | 7 | BACK |
//! | 8 | LEFT_THUMB |
//! | 9 | RIGHT_THUMB |
//! | 10 | LEFT_SHOULDER |
//! | 11 | RIGHT_SHOULDER |
//! | 12 | B |
//! | 13 | Y |
//!
//! Indices 14-16 are unbound by default.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::SimBridgeError;
use crate::protocol::wire::{ControllerReading, MAX_BUTTONS};

/// Virtual gamepad button
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamepadButton {
    /// Unbound
    None,
    A,
    B,
    X,
    Y,
    Start,
    Back,
    LeftShoulder,
    RightShoulder,
    LeftThumb,
    RightThumb,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Guide,
}

impl GamepadButton {
    /// All buttons, in menu order.
    pub const ALL: [GamepadButton; 16] = [
        GamepadButton::None,
        GamepadButton::A,
        GamepadButton::B,
        GamepadButton::X,
        GamepadButton::Y,
        GamepadButton::Start,
        GamepadButton::Back,
        GamepadButton::LeftShoulder,
        GamepadButton::RightShoulder,
        GamepadButton::LeftThumb,
        GamepadButton::RightThumb,
        GamepadButton::DpadUp,
        GamepadButton::DpadDown,
        GamepadButton::DpadLeft,
        GamepadButton::DpadRight,
        GamepadButton::Guide,
    ];

    /// Name as used in profiles.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            GamepadButton::None => "NONE",
            GamepadButton::A => "A",
            GamepadButton::B => "B",
            GamepadButton::X => "X",
            GamepadButton::Y => "Y",
            GamepadButton::Start => "START",
            GamepadButton::Back => "BACK",
            GamepadButton::LeftShoulder => "LEFT_SHOULDER",
            GamepadButton::RightShoulder => "RIGHT_SHOULDER",
            GamepadButton::LeftThumb => "LEFT_THUMB",
            GamepadButton::RightThumb => "RIGHT_THUMB",
            GamepadButton::DpadUp => "DPAD_UP",
            GamepadButton::DpadDown => "DPAD_DOWN",
            GamepadButton::DpadLeft => "DPAD_LEFT",
            GamepadButton::DpadRight => "DPAD_RIGHT",
            GamepadButton::Guide => "GUIDE",
        }
    }
}

impl fmt::Display for GamepadButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GamepadButton {
    type Err = SimBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        GamepadButton::ALL
            .iter()
            .copied()
            .find(|button| button.name() == wanted)
            .ok_or_else(|| SimBridgeError::InvalidValue(format!("unknown gamepad button {:?}", s)))
    }
}

/// Wheel button index → gamepad button.
///
/// Serialized as a JSON object keyed by the index as a string.
///
/// # Examples
///
/// ```
/// use sim_race_bridge::controller::button_map::{ButtonMap, GamepadButton};
///
/// let map = ButtonMap::default();
/// assert_eq!(map.get(0), GamepadButton::Start);
/// assert_eq!(map.get(16), GamepadButton::None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonMap(BTreeMap<usize, GamepadButton>);

impl Default for ButtonMap {
    fn default() -> Self {
        use GamepadButton::*;

        let bindings = [
            Start,
            A,
            X,
            DpadRight,
            DpadLeft,
            DpadUp,
            DpadDown,
            Back,
            LeftThumb,
            RightThumb,
            LeftShoulder,
            RightShoulder,
            B,
            Y,
        ];
        Self(bindings.into_iter().enumerate().collect())
    }
}

impl ButtonMap {
    /// Creates a map with every index unbound.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Button bound to `index` (`None` when unbound).
    #[must_use]
    pub fn get(&self, index: usize) -> GamepadButton {
        self.0.get(&index).copied().unwrap_or(GamepadButton::None)
    }

    /// Binds `index` to `button`. Indices beyond the wire limit are ignored.
    ///
    /// Returns `true` if the binding was stored.
    pub fn set(&mut self, index: usize, button: GamepadButton) -> bool {
        if index >= MAX_BUTTONS {
            return false;
        }
        if button == GamepadButton::None {
            self.0.remove(&index);
        } else {
            self.0.insert(index, button);
        }
        true
    }

    /// Bound (index, button) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, GamepadButton)> + '_ {
        self.0
            .iter()
            .map(|(&index, &button)| (index, button))
            .filter(|&(_, button)| button != GamepadButton::None)
    }

    /// Gamepad buttons held down by a reading.
    #[must_use]
    pub fn pressed(&self, reading: &ControllerReading) -> BTreeSet<GamepadButton> {
        self.iter()
            .filter(|&(index, _)| reading.is_pressed(index))
            .map(|(_, button)| button)
            .collect()
    }
}
