//! # Wheel Line Protocol Module
//!
//! Implementation of the ASCII line protocol spoken by the wheel base.
//!
//! This module handles:
//! - Controller line decoding (steering, pedals, buttons, handbrake, shifter)
//! - Feedback line encoding (RPM, gear, speed, lateral feedback, rumble, RPM %)
//! - Range clamping of 8-bit axes

pub mod wire;
pub mod encoder;
pub mod decoder;
