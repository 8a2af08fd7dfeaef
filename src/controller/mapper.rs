//! # Input Mapper Module
//!
//! Turns decoded wheel readings into virtual gamepad state and keyboard taps.
//!
//! ## Mapping
//!
//! - Steering angle → left stick X (see [`SteeringAxis`])
//! - Throttle → right trigger, brake → left trigger
//! - Buttons → gamepad buttons through the [`ButtonMap`]
//! - Handbrake rising edge → `space` tap
//! - Manual gear mode: a change of the classified gear to 1-6 taps that
//!   digit key
//!
//! ## Usage
//!
//! ```
//! use sim_race_bridge::controller::button_map::ButtonMap;
//! use sim_race_bridge::controller::mapper::InputMapper;
//! use sim_race_bridge::protocol::decoder::decode_line;
//!
//! let mut mapper = InputMapper::default();
//! let reading = decode_line("45-255-0-1-0-127-127").unwrap();
//! let mapped = mapper.process(&reading, &ButtonMap::default());
//!
//! assert_eq!(mapped.state.right_trigger, 255);
//! assert!(mapped.state.left_stick_x > 16000);
//! ```

use std::collections::BTreeSet;

use super::button_map::{ButtonMap, GamepadButton};
use super::gear_grid::GearGrid;
use super::steering::SteeringAxis;
use crate::protocol::wire::ControllerReading;

/// Key tapped when the handbrake is pulled
pub const HANDBRAKE_KEY: &str = "space";

/// Digit keys tapped for gears 1-6 in manual gear mode
pub const GEAR_KEYS: [&str; 6] = ["1", "2", "3", "4", "5", "6"];

/// Complete virtual gamepad state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GamepadState {
    /// Left stick X (-32767 = full left, 32767 = full right)
    pub left_stick_x: i16,

    /// Left trigger (0-255)
    pub left_trigger: u8,

    /// Right trigger (0-255)
    pub right_trigger: u8,

    /// Buttons currently held
    pub buttons: BTreeSet<GamepadButton>,
}

impl GamepadState {
    /// Everything released and centered.
    #[must_use]
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Check if any button is held.
    #[must_use]
    pub fn any_button_pressed(&self) -> bool {
        !self.buttons.is_empty()
    }
}

/// Result of mapping one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedInput {
    pub state: GamepadState,

    /// Keys to tap, in order
    pub key_taps: Vec<&'static str>,

    /// Classified shifter gear (0 = neutral)
    pub gear: u8,

    /// Highest pressed wheel button index, if any
    pub last_pressed_button: Option<usize>,
}

/// Stateful reading → gamepad mapper.
///
/// Keeps the previous handbrake bit and shifter gear so edges can be
/// detected. Call [`InputMapper::reset`] when the wheel disconnects.
#[derive(Debug, Clone)]
pub struct InputMapper {
    steering: SteeringAxis,
    grid: GearGrid,
    manual_gear: bool,
    handbrake_was_engaged: bool,
    last_gear: u8,
}

impl Default for InputMapper {
    fn default() -> Self {
        Self::new(SteeringAxis::default(), GearGrid::default())
    }
}

impl InputMapper {
    /// Creates a mapper with manual gear mode off.
    #[must_use]
    pub fn new(steering: SteeringAxis, grid: GearGrid) -> Self {
        Self {
            steering,
            grid,
            manual_gear: false,
            handbrake_was_engaged: false,
            last_gear: 0,
        }
    }

    /// Enables or disables digit-key gear taps.
    pub fn set_manual_gear(&mut self, enabled: bool) {
        self.manual_gear = enabled;
    }

    #[must_use]
    pub fn manual_gear(&self) -> bool {
        self.manual_gear
    }

    /// Gear classified from the last processed reading.
    #[must_use]
    pub fn last_gear(&self) -> u8 {
        self.last_gear
    }

    /// Maps one reading.
    pub fn process(&mut self, reading: &ControllerReading, map: &ButtonMap) -> MappedInput {
        let state = GamepadState {
            left_stick_x: self.steering.to_stick(reading.angle),
            left_trigger: reading.brake,
            right_trigger: reading.throttle,
            buttons: map.pressed(reading),
        };

        let mut key_taps = Vec::new();

        let handbrake = reading.handbrake_engaged();
        if handbrake && !self.handbrake_was_engaged {
            key_taps.push(HANDBRAKE_KEY);
        }
        self.handbrake_was_engaged = handbrake;

        let gear = self.grid.classify(reading.shifter_x, reading.shifter_y);
        if gear != self.last_gear {
            if self.manual_gear && (1..=6).contains(&gear) {
                key_taps.push(GEAR_KEYS[usize::from(gear) - 1]);
            }
            self.last_gear = gear;
        }

        let last_pressed_button = reading.buttons.iter().rposition(|&state| state != 0);

        MappedInput {
            state,
            key_taps,
            gear,
            last_pressed_button,
        }
    }

    /// Forgets edge state, as if the wheel was at rest.
    pub fn reset(&mut self) {
        self.handbrake_was_engaged = false;
        self.last_gear = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decoder::decode_line;

    fn process(mapper: &mut InputMapper, line: &str) -> MappedInput {
        mapper.process(&decode_line(line).unwrap(), &ButtonMap::default())
    }

    // ==================== GamepadState Tests ====================

    #[test]
    fn test_gamepad_state_neutral() {
        let state = GamepadState::neutral();
        assert_eq!(state.left_stick_x, 0);
        assert_eq!(state.left_trigger, 0);
        assert_eq!(state.right_trigger, 0);
        assert!(!state.any_button_pressed());
    }

    // ==================== Axis Mapping Tests ====================

    #[test]
    fn test_neutral_reading_maps_to_neutral_state() {
        let mut mapper = InputMapper::default();
        let mapped = process(&mut mapper, "0-0-0-0-127-127");
        assert_eq!(mapped.state, GamepadState::neutral());
        assert!(mapped.key_taps.is_empty());
        assert_eq!(mapped.gear, 0);
        assert_eq!(mapped.last_pressed_button, None);
    }

    #[test]
    fn test_pedals_map_to_triggers() {
        let mut mapper = InputMapper::default();
        let mapped = process(&mut mapper, "0-200-10-0-127-127");
        assert_eq!(mapped.state.right_trigger, 200);
        assert_eq!(mapped.state.left_trigger, 10);
    }

    #[test]
    fn test_steering_maps_to_left_stick() {
        let mut mapper = InputMapper::default();
        assert_eq!(process(&mut mapper, "-90-0-0").state.left_stick_x, -32767);
        assert_eq!(process(&mut mapper, "500-0-0").state.left_stick_x, 32767);
    }

    // ==================== Button Tests ====================

    #[test]
    fn test_buttons_and_last_pressed() {
        let mut mapper = InputMapper::default();
        let mapped = process(&mut mapper, "-45.5-200-10-1-0-1-0-100-127");
        assert!(mapped.state.buttons.contains(&GamepadButton::Start));
        assert!(mapped.state.buttons.contains(&GamepadButton::X));
        assert_eq!(mapped.state.buttons.len(), 2);
        assert_eq!(mapped.last_pressed_button, Some(2));
    }

    // ==================== Handbrake Tests ====================

    #[test]
    fn test_handbrake_taps_on_rising_edge_only() {
        let mut mapper = InputMapper::default();
        assert_eq!(process(&mut mapper, "0-0-0-1-127-127").key_taps, vec![HANDBRAKE_KEY]);
        assert!(process(&mut mapper, "0-0-0-1-127-127").key_taps.is_empty());
        assert!(process(&mut mapper, "0-0-0-0-127-127").key_taps.is_empty());
        assert_eq!(process(&mut mapper, "0-0-0-1-127-127").key_taps, vec![HANDBRAKE_KEY]);
    }

    #[test]
    fn test_reset_rearms_handbrake() {
        let mut mapper = InputMapper::default();
        process(&mut mapper, "0-0-0-1-127-127");
        mapper.reset();
        assert_eq!(process(&mut mapper, "0-0-0-1-127-127").key_taps, vec![HANDBRAKE_KEY]);
    }

    // ==================== Manual Gear Tests ====================

    #[test]
    fn test_gear_taps_disabled_by_default() {
        let mut mapper = InputMapper::default();
        let mapped = process(&mut mapper, "0-0-0-0-200-20");
        assert_eq!(mapped.gear, 1);
        assert!(mapped.key_taps.is_empty());
    }

    #[test]
    fn test_manual_gear_taps_on_change() {
        let mut mapper = InputMapper::default();
        mapper.set_manual_gear(true);

        assert_eq!(process(&mut mapper, "0-0-0-0-200-20").key_taps, vec!["1"]);
        // Holding the gear does not repeat the tap
        assert!(process(&mut mapper, "0-0-0-0-200-20").key_taps.is_empty());
        // Neutral is not tapped
        assert!(process(&mut mapper, "0-0-0-0-127-127").key_taps.is_empty());
        assert_eq!(process(&mut mapper, "0-0-0-0-50-230").key_taps, vec!["6"]);
        assert_eq!(mapper.last_gear(), 6);
    }

    #[test]
    fn test_handbrake_and_gear_in_same_cycle() {
        let mut mapper = InputMapper::default();
        mapper.set_manual_gear(true);
        let mapped = process(&mut mapper, "0-0-0-1-120-20");
        assert_eq!(mapped.key_taps, vec![HANDBRAKE_KEY, "3"]);
    }
}
