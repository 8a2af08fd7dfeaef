//! # Steering Module
//!
//! Maps the wheel angle onto the virtual gamepad's left stick X axis.
//!
//! The wheel reports degrees from center. The configured lock is split evenly
//! between both directions, so a 180° lock saturates the stick at ±90°:
//!
//! `stick = clamp(angle, -lock/2, lock/2) / (lock/2) * 32767`
//!
//! ## Usage
//!
//! ```
//! use sim_race_bridge::controller::steering::SteeringAxis;
//!
//! let axis = SteeringAxis::new(180.0);
//! assert_eq!(axis.to_stick(0.0), 0);
//! assert_eq!(axis.to_stick(90.0), 32767);
//! assert_eq!(axis.to_stick(-400.0), -32767);
//! ```

/// Full deflection of a gamepad stick axis
pub const STICK_MAX: i16 = i16::MAX;

/// Converts wheel angles into stick deflection.
#[derive(Debug, Clone, Copy)]
pub struct SteeringAxis {
    /// Half of the lock-to-lock rotation, in degrees.
    half_lock: f32,
}

impl Default for SteeringAxis {
    fn default() -> Self {
        Self::new(180.0)
    }
}

impl SteeringAxis {
    /// Creates a steering axis for a lock-to-lock rotation in degrees.
    ///
    /// Non-positive or non-finite locks fall back to 180°.
    #[must_use]
    pub fn new(lock_degrees: f32) -> Self {
        let lock = if lock_degrees.is_finite() && lock_degrees > 0.0 {
            lock_degrees
        } else {
            180.0
        };
        Self {
            half_lock: lock / 2.0,
        }
    }

    /// Returns the configured lock-to-lock rotation.
    #[must_use]
    pub fn lock_degrees(&self) -> f32 {
        self.half_lock * 2.0
    }

    /// Normalizes an angle into -1.0..=1.0.
    ///
    /// NaN maps to center.
    #[must_use]
    pub fn normalize(&self, angle: f32) -> f32 {
        if angle.is_nan() {
            return 0.0;
        }
        angle.clamp(-self.half_lock, self.half_lock) / self.half_lock
    }

    /// Maps an angle onto the stick range.
    #[must_use]
    pub fn to_stick(&self, angle: f32) -> i16 {
        let value = self.normalize(angle) * f32::from(STICK_MAX);
        value.clamp(-f32::from(STICK_MAX), f32::from(STICK_MAX)) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        let axis = SteeringAxis::default();
        assert_eq!(axis.to_stick(0.0), 0);
        assert_eq!(axis.normalize(0.0), 0.0);
    }

    #[test]
    fn test_full_lock() {
        let axis = SteeringAxis::new(180.0);
        assert_eq!(axis.to_stick(90.0), 32767);
        assert_eq!(axis.to_stick(-90.0), -32767);
    }

    #[test]
    fn test_beyond_lock_is_clamped() {
        let axis = SteeringAxis::new(180.0);
        assert_eq!(axis.to_stick(720.0), 32767);
        assert_eq!(axis.to_stick(-720.0), -32767);
        assert_eq!(axis.to_stick(f32::INFINITY), 32767);
    }

    #[test]
    fn test_half_deflection() {
        let axis = SteeringAxis::new(180.0);
        let stick = axis.to_stick(45.0);
        assert!((stick as i32 - 16383).abs() <= 1, "got {}", stick);

        let stick = axis.to_stick(-45.5);
        assert!(stick < -16383 && stick > -16700, "got {}", stick);
    }

    #[test]
    fn test_wider_lock() {
        let axis = SteeringAxis::new(900.0);
        assert_eq!(axis.lock_degrees(), 900.0);
        assert_eq!(axis.to_stick(450.0), 32767);
        assert!((axis.normalize(90.0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_lock_falls_back() {
        assert_eq!(SteeringAxis::new(0.0).lock_degrees(), 180.0);
        assert_eq!(SteeringAxis::new(-10.0).lock_degrees(), 180.0);
        assert_eq!(SteeringAxis::new(f32::NAN).lock_degrees(), 180.0);
    }

    #[test]
    fn test_nan_angle_is_centered() {
        let axis = SteeringAxis::default();
        assert_eq!(axis.to_stick(f32::NAN), 0);
    }
}
