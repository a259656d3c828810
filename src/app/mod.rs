//! Application core: pure domain logic, zero I/O.
//!
//! This module holds the supervisory cycle for the pack: fault latching,
//! relay control, health estimation, alert gating and telemetry.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod alerts;
pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
