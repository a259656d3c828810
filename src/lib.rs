//! EV battery management firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod analytics;
pub mod app;
pub mod config;
pub mod error;
pub mod frame;
pub mod geofence;
pub mod health;
pub mod motion;
pub mod persist;
pub mod pins;
pub mod relays;
pub mod safety;
pub mod task_pin;
pub mod watchdog;
