//! # Input Sink Module
//!
//! Output side of the controller path: something that can hold a virtual
//! gamepad state and tap keyboard keys.
//!
//! Real virtual-gamepad drivers live outside this crate. The bridge only
//! depends on the [`InputSink`] trait; [`TracingSink`] records the state it
//! is given so the bridge can run on any host.

use tracing::{debug, info};

use super::mapper::GamepadState;
use crate::error::{Result, SimBridgeError};

/// Virtual gamepad / keyboard output
#[cfg_attr(test, mockall::automock)]
pub trait InputSink: Send {
    /// Replace the full gamepad state.
    fn update(&mut self, state: &GamepadState) -> Result<()>;

    /// Press and release a keyboard key.
    fn tap_key(&mut self, key: &str) -> Result<()>;
}

/// Sink that logs gamepad changes instead of driving a device.
#[derive(Debug, Default)]
pub struct TracingSink {
    last: GamepadState,
    taps: u64,
}

impl TracingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last state received.
    #[must_use]
    pub fn state(&self) -> &GamepadState {
        &self.last
    }

    /// Number of key taps so far.
    #[must_use]
    pub fn taps(&self) -> u64 {
        self.taps
    }
}

impl InputSink for TracingSink {
    fn update(&mut self, state: &GamepadState) -> Result<()> {
        if *state != self.last {
            debug!(
                "Gamepad: LX={} LT={} RT={} buttons={:?}",
                state.left_stick_x, state.left_trigger, state.right_trigger, state.buttons
            );
            self.last = state.clone();
        }
        Ok(())
    }

    fn tap_key(&mut self, key: &str) -> Result<()> {
        self.taps += 1;
        info!("Key tap: {}", key);
        Ok(())
    }
}

/// Connect the sink named in `[input] sink`.
///
/// # Errors
///
/// Returns `DriverUnavailable` for `none` or an unknown kind. The bridge then
/// runs feedback-only.
pub fn connect_sink(kind: &str) -> Result<Box<dyn InputSink>> {
    match kind {
        "log" => {
            info!("Input sink: tracing");
            Ok(Box::new(TracingSink::new()))
        }
        "none" => Err(SimBridgeError::DriverUnavailable(
            "input sink disabled".to_string(),
        )),
        other => Err(SimBridgeError::DriverUnavailable(format!(
            "unknown input sink {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::button_map::GamepadButton;

    #[test]
    fn test_tracing_sink_tracks_state() {
        let mut sink = TracingSink::new();
        let mut state = GamepadState::neutral();
        state.right_trigger = 180;
        state.buttons.insert(GamepadButton::A);

        sink.update(&state).unwrap();
        assert_eq!(sink.state(), &state);

        sink.tap_key("space").unwrap();
        sink.tap_key("3").unwrap();
        assert_eq!(sink.taps(), 2);
    }

    #[test]
    fn test_connect_log_sink() {
        let mut sink = connect_sink("log").unwrap();
        assert!(sink.update(&GamepadState::neutral()).is_ok());
    }

    #[test]
    fn test_connect_none_is_unavailable() {
        assert!(matches!(
            connect_sink("none"),
            Err(SimBridgeError::DriverUnavailable(_))
        ));
        assert!(matches!(
            connect_sink("vigem"),
            Err(SimBridgeError::DriverUnavailable(_))
        ));
    }

    #[test]
    fn test_mock_sink_expectations() {
        let mut sink = MockInputSink::new();
        sink.expect_tap_key()
            .withf(|key: &str| key == "space")
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_update().times(1).returning(|_| Ok(()));

        sink.update(&GamepadState::neutral()).unwrap();
        sink.tap_key("space").unwrap();
    }
}
