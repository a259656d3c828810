//! Outbound application events, alerts and telemetry.
//!
//! The [`BmsService`](super::service::BmsService) emits these through the
//! [`EventSink`](super::ports::EventSink), [`AlertPort`](super::ports::AlertPort)
//! and [`TelemetryPort`](super::ports::TelemetryPort) ports. Alerts are
//! structured records; turning them into text is the adapter's job.

use serde::{Deserialize, Serialize};

use crate::error::FaultKind;
use crate::frame::GpsFix;
use crate::relays::StopReason;

// ───────────────────────────────────────────────────────────────
// Alerts
// ───────────────────────────────────────────────────────────────

/// Rate-limiting class of an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Fault,
    Thermal,
    Charging,
    Geofence,
    Impact,
    Anomaly,
    Health,
}

/// Structured alert: a kind plus its numeric payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alert {
    FaultLatched { kind: FaultKind, severity: u8 },
    FaultsRecovered,
    ThermalTrip { temp_c: f32 },
    ThermalClear { temp_c: f32 },
    ChargingStopped { reason: StopReason },
    ReadyToCharge { pack_v: f32 },
    ChargeComplete { pack_v: f32, cycle_count: u64 },
    Geofence { position: GpsFix, distance_m: f32 },
    Impact {
        peak_g: f32,
        impact_count: u32,
        shock_count: u32,
        position: Option<GpsFix>,
    },
    Anomaly { score: u8 },
    ReplacementDue { soh: f32, days_left: Option<u64> },
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Self::FaultLatched { .. } | Self::FaultsRecovered => AlertKind::Fault,
            Self::ThermalTrip { .. } | Self::ThermalClear { .. } => AlertKind::Thermal,
            Self::ChargingStopped { .. }
            | Self::ReadyToCharge { .. }
            | Self::ChargeComplete { .. } => AlertKind::Charging,
            Self::Geofence { .. } => AlertKind::Geofence,
            Self::Impact { .. } => AlertKind::Impact,
            Self::Anomaly { .. } => AlertKind::Anomaly,
            Self::ReplacementDue { .. } => AlertKind::Health,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Application events
// ───────────────────────────────────────────────────────────────

/// Which relay an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    Charge,
    Motor,
    Fan,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started (carries the restored SOC and SOH).
    Started { soc: f32, soh: f32 },
    /// The pack went from clear to latched.
    FaultLatched { kind: FaultKind, severity: u8 },
    /// One fault bit was set.
    FaultRaised(FaultKind),
    /// One fault bit auto-cleared.
    FaultCleared(FaultKind),
    /// Every fault auto-cleared; motor re-enabled.
    FaultsRecovered,
    /// An operator cleared all faults.
    FaultsClearedManually,
    RelayChanged { relay: Relay, on: bool },
    ChargeCycleCompleted { cycle_count: u64 },
    FreeFall,
    Impact { peak_g: f32 },
    Shock { peak_g: f32 },
    GeofenceViolation { distance_m: f32 },
    SocLow { soc: f32 },
    SocCritical { soc: f32 },
    SohDegraded { soh: f32 },
    /// An alert could not be handed to the uplink and was dropped.
    AlertDropped(AlertKind),
    /// Periodic telemetry snapshot.
    Telemetry(TelemetryRecord),
}

// ───────────────────────────────────────────────────────────────
// Telemetry
// ───────────────────────────────────────────────────────────────

/// Flat point-in-time record suitable for logging or upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub uptime_ms: u64,
    pub pack_v: f32,
    pub cell_min_v: f32,
    pub cell_max_v: f32,
    pub cell_imbalance_v: f32,
    pub current_a: f32,
    pub temp_max_c: f32,
    pub temp_min_c: f32,
    pub soc: f32,
    pub remaining_ah: f32,
    pub soh: f32,
    pub rul_cycles: i32,
    pub rul_hours: u64,
    pub rul_percent: f32,
    pub replacement_needed: bool,
    pub charging: bool,
    pub motor: bool,
    pub fan: bool,
    pub thermal_tripped: bool,
    pub fault_latched: bool,
    pub fault: heapless::String<63>,
    pub fault_severity: u8,
    pub fault_count: u32,
    pub fault_bits: u16,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub impact_count: u32,
    pub shock_count: u32,
    pub anomaly_score: u8,
    pub cycle_count: u64,
}

impl TelemetryRecord {
    /// JSON body for HTTP upload.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
