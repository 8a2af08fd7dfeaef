//! # Wire Protocol Constants and Types
//!
//! Core definitions for the wheel ↔ PC line protocol.
//!
//! ```text
//! wheel → PC:  <angle>-<throttle>-<brake>[-<btn0>...-<btnN>]-<handbrake>-<gx>-<gy>\n
//! PC → wheel:  <rpm>;<R|N|gear>;<speed_kmh>;<gx_feedback>;<rumble>;<rpm_pct>\n
//! ```

use std::fmt;

/// Field separator of controller lines
pub const FIELD_SEPARATOR: char = '-';

/// Field separator of feedback lines
pub const FEEDBACK_SEPARATOR: char = ';';

/// Line terminator for both directions
pub const LINE_TERMINATOR: char = '\n';

/// 8-bit axis range (pedals, shifter, feedback bytes)
pub const AXIS_MIN: u8 = 0;
pub const AXIS_MAX: u8 = 255;

/// Resting position of both shifter axes
pub const SHIFTER_CENTER: u8 = 127;

/// Lateral feedback byte that means "no lateral load"
pub const GX_FEEDBACK_CENTER: u8 = 127;

/// Upper bound of the RPM percentage field
pub const RPM_PERCENT_MAX: u8 = 100;

/// Maximum number of buttons tracked per line
pub const MAX_BUTTONS: usize = 17;

/// Clamp a raw integer into the 8-bit axis range.
///
/// Idempotent: `clamp_axis(clamp_axis(x) as i64) == clamp_axis(x)`.
#[must_use]
pub fn clamp_axis(value: i64) -> u8 {
    value.clamp(AXIS_MIN as i64, AXIS_MAX as i64) as u8
}

/// One decoded line from the wheel base.
///
/// Pedal and shifter values are already clamped to 0-255. The steering angle
/// is kept as sent; it is only limited when mapped onto a gamepad axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerReading {
    /// Steering angle in degrees (negative = left)
    pub angle: f32,

    /// Throttle pedal (0-255)
    pub throttle: u8,

    /// Brake pedal (0-255)
    pub brake: u8,

    /// Button states in wire order (0 = released, 1 = pressed)
    pub buttons: Vec<u8>,

    /// Handbrake bit (0/1)
    pub handbrake: u8,

    /// Shifter X axis (0-255)
    pub shifter_x: u8,

    /// Shifter Y axis (0-255)
    pub shifter_y: u8,
}

impl Default for ControllerReading {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ControllerReading {
    /// Reading with everything released and the shifter centered.
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            angle: 0.0,
            throttle: 0,
            brake: 0,
            buttons: Vec::new(),
            handbrake: 0,
            shifter_x: SHIFTER_CENTER,
            shifter_y: SHIFTER_CENTER,
        }
    }

    /// Whether the button at `index` is pressed.
    #[must_use]
    pub fn is_pressed(&self, index: usize) -> bool {
        self.buttons.get(index).is_some_and(|&state| state != 0)
    }

    /// Whether the handbrake bit is set.
    #[must_use]
    pub fn handbrake_engaged(&self) -> bool {
        self.handbrake != 0
    }
}

/// Gear as shown on the wheel display.
///
/// `-1` is rendered as `R`, `0` as `N`, anything else as its decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GearLabel(pub i32);

impl fmt::Display for GearLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            -1 => f.write_str("R"),
            0 => f.write_str("N"),
            gear => write!(f, "{}", gear),
        }
    }
}

/// Outbound feedback fields, pre-clamped to their wire ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackLine {
    /// Engine RPM
    pub rpm: u32,

    /// Gear (-1 = reverse, 0 = neutral)
    pub gear: i32,

    /// Speed in km/h (truncated)
    pub speed: u32,

    /// Lateral force feedback byte (127 = centered)
    pub gx: u8,

    /// Rumble intensity (0-255)
    pub rumble: u8,

    /// RPM as a percentage of the game's redline (0-100)
    pub rpm_pct: u8,
}

impl Default for FeedbackLine {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl FeedbackLine {
    /// Response sent when no telemetry is available
    pub const NEUTRAL: FeedbackLine = FeedbackLine {
        rpm: 0,
        gear: 0,
        speed: 0,
        gx: GX_FEEDBACK_CENTER,
        rumble: 0,
        rpm_pct: 0,
    };

    /// Gear label for the display field.
    #[must_use]
    pub fn gear_label(&self) -> GearLabel {
        GearLabel(self.gear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_axis_range() {
        assert_eq!(clamp_axis(-5), 0);
        assert_eq!(clamp_axis(0), 0);
        assert_eq!(clamp_axis(128), 128);
        assert_eq!(clamp_axis(255), 255);
        assert_eq!(clamp_axis(1000), 255);
    }

    #[test]
    fn test_clamp_axis_idempotent() {
        for raw in [-300i64, -1, 0, 1, 127, 254, 255, 256, 9999] {
            let once = clamp_axis(raw);
            assert_eq!(clamp_axis(once as i64), once, "clamp not idempotent for {}", raw);
        }
    }

    #[test]
    fn test_neutral_reading() {
        let reading = ControllerReading::neutral();
        assert_eq!(reading.angle, 0.0);
        assert_eq!(reading.throttle, 0);
        assert_eq!(reading.brake, 0);
        assert!(reading.buttons.is_empty());
        assert_eq!(reading.handbrake, 0);
        assert_eq!(reading.shifter_x, SHIFTER_CENTER);
        assert_eq!(reading.shifter_y, SHIFTER_CENTER);
        assert_eq!(reading, ControllerReading::default());
    }

    #[test]
    fn test_is_pressed_out_of_range() {
        let reading = ControllerReading {
            buttons: vec![0, 1],
            ..ControllerReading::neutral()
        };
        assert!(!reading.is_pressed(0));
        assert!(reading.is_pressed(1));
        assert!(!reading.is_pressed(2));
    }

    #[test]
    fn test_gear_labels() {
        assert_eq!(GearLabel(-1).to_string(), "R");
        assert_eq!(GearLabel(0).to_string(), "N");
        assert_eq!(GearLabel(1).to_string(), "1");
        assert_eq!(GearLabel(8).to_string(), "8");
    }

    #[test]
    fn test_neutral_feedback_line() {
        let line = FeedbackLine::NEUTRAL;
        assert_eq!(line.gx, 127);
        assert_eq!(line.gear_label().to_string(), "N");
        assert_eq!(FeedbackLine::default(), line);
    }
}
