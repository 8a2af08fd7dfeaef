//! # Feedback Module
//!
//! Turns the latest telemetry frame into the feedback line for the wheel.
//!
//! ## Fields
//!
//! - `gx = clamp(trunc(g_lat * lateral_gain) + 127)`
//! - `rumble = max(on_curb ? curb_rumble : 0, trunc(rumble * RUMBLE_GAIN))`;
//!   a curb hit wins over ambient rumble, they are not added. An active FFB
//!   test value replaces the result.
//! - `rpm_pct = clamp(trunc(rpm / max_rpm * 100), 0, 100)`
//!
//! Without a frame the neutral line `0;N;0;127;0;0` is sent.

use crate::config::FeedbackConfig;
use crate::protocol::wire::{clamp_axis, FeedbackLine, GX_FEEDBACK_CENTER, RPM_PERCENT_MAX};
use crate::telemetry::{Game, UnifiedTelemetryFrame};

/// Ambient rumble (nominally 0..1) → rumble byte gain
pub const RUMBLE_GAIN: f32 = 250.0;

/// Builds [`FeedbackLine`]s for one game.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackComposer {
    max_rpm: u32,
    curb_rumble: u8,
    lateral_gain: f32,
}

impl Default for FeedbackComposer {
    fn default() -> Self {
        Self::for_game(Game::None, &FeedbackConfig::default())
    }
}

impl FeedbackComposer {
    #[must_use]
    pub fn for_game(game: Game, config: &FeedbackConfig) -> Self {
        Self {
            max_rpm: game.max_rpm(),
            curb_rumble: config.curb_rumble,
            lateral_gain: config.lateral_gain,
        }
    }

    #[must_use]
    pub fn max_rpm(&self) -> u32 {
        self.max_rpm
    }

    /// Compose the feedback line.
    ///
    /// # Arguments
    ///
    /// * `frame` - Latest telemetry, if any
    /// * `test_rumble` - FFB test value that overrides the rumble byte
    ///
    /// # Examples
    ///
    /// ```
    /// use sim_race_bridge::feedback::FeedbackComposer;
    /// use sim_race_bridge::protocol::encoder::encode_feedback;
    ///
    /// let composer = FeedbackComposer::default();
    /// assert_eq!(encode_feedback(&composer.compose(None, None)), "0;N;0;127;0;0\n");
    /// assert_eq!(encode_feedback(&composer.compose(None, Some(180))), "0;N;0;127;180;0\n");
    /// ```
    #[must_use]
    pub fn compose(&self, frame: Option<&UnifiedTelemetryFrame>, test_rumble: Option<u8>) -> FeedbackLine {
        let Some(frame) = frame else {
            return FeedbackLine {
                rumble: test_rumble.unwrap_or(0),
                ..FeedbackLine::NEUTRAL
            };
        };

        let gx = clamp_axis(trunc(frame.g_lat * self.lateral_gain) + i64::from(GX_FEEDBACK_CENTER));

        let curb = if frame.on_curb { i64::from(self.curb_rumble) } else { 0 };
        let ambient = trunc(frame.rumble * RUMBLE_GAIN);
        let rumble = test_rumble.unwrap_or_else(|| clamp_axis(curb.max(ambient)));

        let pct = if self.max_rpm == 0 {
            0
        } else {
            (u64::from(frame.rpm) * 100 / u64::from(self.max_rpm)).min(u64::from(RPM_PERCENT_MAX))
        };

        FeedbackLine {
            rpm: frame.rpm,
            gear: frame.gear,
            speed: trunc(frame.speed_kmh).max(0) as u32,
            gx,
            rumble,
            rpm_pct: pct as u8,
        }
    }
}

/// Truncate toward zero; NaN becomes 0.
fn trunc(value: f32) -> i64 {
    if value.is_nan() {
        0
    } else {
        value.trunc() as i64
    }
}
