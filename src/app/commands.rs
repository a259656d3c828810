//! Inbound commands to the application service.
//!
//! These represent operator or watchdog actions (serial console, remote
//! uplink, supervisory tasks) that the
//! [`BmsService`](super::service::BmsService) interprets and acts upon.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::config::BmsConfig;
use crate::error::FaultKind;

/// Inbound command queue depth.
pub const COMMAND_DEPTH: usize = 4;

/// Operator interfaces push here; the control loop drains it between ticks.
pub static COMMANDS: Channel<CriticalSectionRawMutex, AppCommand, COMMAND_DEPTH> = Channel::new();

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Manual fault clear. The only way a latched fault is released other
    /// than auto-recovery.
    ClearFaults,

    /// Override the state of charge (0–100 %); persisted immediately.
    ResetSoc(f32),

    /// Declare a fresh pack: SOH back to 100 %.
    ResetSoh,

    /// Move the geofence home point.
    SetGeofenceHome { lat: f64, lon: f64 },

    /// Arm or disarm the geofence.
    SetGeofenceEnabled(bool),

    /// Latch a fault on behalf of an external watchdog
    /// (e.g. [`FaultKind::SensorFailure`], [`FaultKind::CommunicationLoss`]).
    TriggerExternal(FaultKind),

    /// Hot-reload configuration; rejected if it fails validation.
    UpdateConfig(BmsConfig),

    /// Checkpoint SOC, SOH and any unsaved config now.
    SaveState,
}
