//! # Gear Grid Module
//!
//! Classifies the 2-axis H-pattern shifter position into a gear.
//!
//! ## Grid
//!
//! ```text
//!            left   center   right
//!   up        1       3        5
//!   down      2       4        6
//! ```
//!
//! Anything in the neutral row, or between the column bands, is gear 0.
//!
//! ## Usage
//!
//! ```
//! use sim_race_bridge::controller::gear_grid::GearGrid;
//!
//! let grid = GearGrid::default();
//! assert_eq!(grid.classify(127, 127), 0);
//! assert_eq!(grid.classify(127, 20), 3);
//! ```

use crate::config::ShifterConfig;

/// Shifter row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Up,
    Neutral,
    Down,
}

/// Shifter column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Left,
    Center,
    Right,
    /// Between two column bands
    Mid,
}

/// Shifter grid calibration.
///
/// Thresholds are inclusive: a Y value equal to `up_max` is in the up row and
/// one equal to `down_min` in the down row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GearGrid {
    up_max: u8,
    down_min: u8,
    right_max: u8,
    center_min: u8,
    center_max: u8,
    left_min: u8,
    invert_x: bool,
}

impl Default for GearGrid {
    fn default() -> Self {
        Self::from_config(&ShifterConfig::default())
    }
}

impl GearGrid {
    /// Creates a grid from the `[shifter]` configuration section.
    #[must_use]
    pub fn from_config(config: &ShifterConfig) -> Self {
        Self {
            up_max: config.up_max,
            down_min: config.down_min,
            right_max: config.right_max,
            center_min: config.center_min,
            center_max: config.center_max,
            left_min: config.left_min,
            invert_x: config.invert_x,
        }
    }

    /// Row for a Y position.
    #[must_use]
    pub fn row(&self, y: u8) -> Row {
        if y <= self.up_max {
            Row::Up
        } else if y >= self.down_min {
            Row::Down
        } else {
            Row::Neutral
        }
    }

    /// Column for an X position.
    ///
    /// With `invert_x` set (the default wiring) the low X band is the
    /// right-hand column. Clearing it mirrors the two outer columns.
    #[must_use]
    pub fn column(&self, x: u8) -> Column {
        let (low, high) = if self.invert_x {
            (Column::Right, Column::Left)
        } else {
            (Column::Left, Column::Right)
        };

        if x <= self.right_max {
            low
        } else if (self.center_min..=self.center_max).contains(&x) {
            Column::Center
        } else if x >= self.left_min {
            high
        } else {
            Column::Mid
        }
    }

    /// Gear for a shifter position (0 = neutral, 1..=6 forward).
    #[must_use]
    pub fn classify(&self, x: u8, y: u8) -> u8 {
        match (self.column(x), self.row(y)) {
            (Column::Left, Row::Up) => 1,
            (Column::Left, Row::Down) => 2,
            (Column::Center, Row::Up) => 3,
            (Column::Center, Row::Down) => 4,
            (Column::Right, Row::Up) => 5,
            (Column::Right, Row::Down) => 6,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Row Tests ====================

    #[test]
    fn test_row_bands() {
        let grid = GearGrid::default();
        assert_eq!(grid.row(0), Row::Up);
        assert_eq!(grid.row(126), Row::Neutral);
        assert_eq!(grid.row(139), Row::Neutral);
        assert_eq!(grid.row(255), Row::Down);
    }

    #[test]
    fn test_row_thresholds_are_inclusive() {
        let grid = GearGrid::default();
        assert_eq!(grid.row(125), Row::Up);
        assert_eq!(grid.row(140), Row::Down);
    }

    // ==================== Column Tests ====================

    #[test]
    fn test_column_bands_inverted() {
        let grid = GearGrid::default();
        assert_eq!(grid.column(0), Column::Right);
        assert_eq!(grid.column(104), Column::Right);
        assert_eq!(grid.column(105), Column::Mid);
        assert_eq!(grid.column(110), Column::Center);
        assert_eq!(grid.column(132), Column::Center);
        assert_eq!(grid.column(135), Column::Mid);
        assert_eq!(grid.column(138), Column::Left);
        assert_eq!(grid.column(255), Column::Left);
    }

    #[test]
    fn test_column_bands_not_inverted() {
        let config = ShifterConfig {
            invert_x: false,
            ..ShifterConfig::default()
        };
        let grid = GearGrid::from_config(&config);
        assert_eq!(grid.column(20), Column::Left);
        assert_eq!(grid.column(120), Column::Center);
        assert_eq!(grid.column(200), Column::Right);
        assert_eq!(grid.column(107), Column::Mid);
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_center_is_neutral() {
        let grid = GearGrid::default();
        assert_eq!(grid.classify(127, 127), 0);
    }

    #[test]
    fn test_all_gears_default_wiring() {
        let grid = GearGrid::default();
        assert_eq!(grid.classify(200, 20), 1);
        assert_eq!(grid.classify(200, 230), 2);
        assert_eq!(grid.classify(120, 20), 3);
        assert_eq!(grid.classify(120, 230), 4);
        assert_eq!(grid.classify(50, 20), 5);
        assert_eq!(grid.classify(50, 230), 6);
    }

    #[test]
    fn test_mirrored_wiring_swaps_outer_columns() {
        let config = ShifterConfig {
            invert_x: false,
            ..ShifterConfig::default()
        };
        let grid = GearGrid::from_config(&config);
        assert_eq!(grid.classify(50, 20), 1);
        assert_eq!(grid.classify(50, 230), 2);
        assert_eq!(grid.classify(120, 20), 3);
        assert_eq!(grid.classify(200, 20), 5);
        assert_eq!(grid.classify(200, 230), 6);
    }

    #[test]
    fn test_neutral_row_and_mid_column() {
        let grid = GearGrid::default();
        for x in [0u8, 50, 120, 200, 255] {
            assert_eq!(grid.classify(x, 130), 0, "x={} in neutral row", x);
        }
        for y in [0u8, 255] {
            assert_eq!(grid.classify(107, y), 0);
            assert_eq!(grid.classify(135, y), 0);
        }
    }

    #[test]
    fn test_threshold_values_resolve_deterministically() {
        let grid = GearGrid::default();
        assert_eq!(grid.classify(104, 125), 5);
        assert_eq!(grid.classify(110, 140), 4);
        assert_eq!(grid.classify(132, 125), 3);
        assert_eq!(grid.classify(138, 140), 2);
    }

    #[test]
    fn test_classify_is_total_and_pure() {
        let grid = GearGrid::default();
        for x in 0..=255u8 {
            for y in 0..=255u8 {
                let gear = grid.classify(x, y);
                assert!(gear <= 6);
                assert_eq!(grid.classify(x, y), gear);
            }
        }
    }
}
