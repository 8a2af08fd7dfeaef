//! # Controller Module
//!
//! Wheel-side input handling.
//!
//! This module handles:
//! - Shifter gear classification
//! - Steering angle → stick mapping
//! - Button bindings
//! - Reading → gamepad state mapping with handbrake and gear taps
//! - The input sink abstraction

pub mod button_map;
pub mod gear_grid;
pub mod mapper;
pub mod sink;
pub mod steering;
