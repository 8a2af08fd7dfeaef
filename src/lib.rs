//! # Sim Race Bridge Library
//!
//! Bridge a serial sim-racing wheel to a virtual gamepad and feed game
//! telemetry back to it as force feedback.
//!
//! The wheel sends one ASCII line per cycle (steering angle, pedals, buttons,
//! handbrake, shifter). The bridge maps it onto an input sink and answers
//! with a feedback line (rpm, gear, speed, lateral force, rumble) built from
//! F1, Forza or ACC telemetry.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod profile;
pub mod protocol;
pub mod serial;
pub mod telemetry;
