//! Unified error types for the BMS firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform. All variants are `Copy` so they
//! can be passed through the fault engine without allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// What `BmsService` and the runtime tasks return when something fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor frame could not be obtained.
    Sensor(SensorError),
    /// A relay write failed.
    Actuator(ActuatorError),
    /// A safety fault was latched.
    Safety(FaultKind),
    /// An alert or telemetry delivery failed.
    Comms(CommsError),
    /// The durable key/value store failed.
    Storage(StorageError),
    /// A peripheral or service did not come up.
    Init(&'static str),
    /// Configuration or an operator argument is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No frame has been produced by the acquisition side yet.
    NoData,
    /// Acquisition reported a bus or conversion failure.
    ReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no sensor frame yet"),
            Self::ReadFailed => write!(f, "sensor read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Relays
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The relay pin could not be driven.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Fault kinds
// ---------------------------------------------------------------------------

/// Every fault the engine can latch. Each kind owns one bit in the
/// [`FaultSet`](crate::safety::FaultSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FaultKind {
    OverVoltage = 1 << 0,
    UnderVoltage = 1 << 1,
    OverCurrentCharge = 1 << 2,
    OverCurrentDischarge = 1 << 3,
    OverTemperature = 1 << 4,
    UnderTemperature = 1 << 5,
    CellImbalance = 1 << 6,
    SensorFailure = 1 << 7,
    CommunicationLoss = 1 << 8,
    GeofenceViolation = 1 << 9,
    ImpactDetected = 1 << 10,
    ThermalRunaway = 1 << 11,
    BatteryAging = 1 << 12,
}

impl FaultKind {
    pub const ALL: [FaultKind; 13] = [
        Self::OverVoltage,
        Self::UnderVoltage,
        Self::OverCurrentCharge,
        Self::OverCurrentDischarge,
        Self::OverTemperature,
        Self::UnderTemperature,
        Self::CellImbalance,
        Self::SensorFailure,
        Self::CommunicationLoss,
        Self::GeofenceViolation,
        Self::ImpactDetected,
        Self::ThermalRunaway,
        Self::BatteryAging,
    ];

    /// This kind's bit in a `FaultSet`.
    pub const fn mask(self) -> u16 {
        self as u16
    }

    /// Whether the engine may clear this fault on its own once the
    /// condition resolves with hysteresis.
    pub const fn is_auto_recoverable(self) -> bool {
        matches!(
            self,
            Self::OverVoltage
                | Self::UnderVoltage
                | Self::OverCurrentCharge
                | Self::OverCurrentDischarge
                | Self::OverTemperature
                | Self::UnderTemperature
        )
    }

    /// Upper-case label used in fault records and telemetry.
    pub const fn label(self) -> &'static str {
        match self {
            Self::OverVoltage => "OVER VOLTAGE",
            Self::UnderVoltage => "UNDER VOLTAGE",
            Self::OverCurrentCharge => "OVER CURRENT CHARGE",
            Self::OverCurrentDischarge => "OVER CURRENT DISCHARGE",
            Self::OverTemperature => "OVER TEMPERATURE",
            Self::UnderTemperature => "UNDER TEMPERATURE",
            Self::CellImbalance => "CELL IMBALANCE",
            Self::SensorFailure => "SENSOR FAILURE",
            Self::CommunicationLoss => "COMMUNICATION LOSS",
            Self::GeofenceViolation => "GEOFENCE VIOLATION",
            Self::ImpactDetected => "IMPACT DETECTED",
            Self::ThermalRunaway => "THERMAL RUNAWAY",
            Self::BatteryAging => "BATTERY AGING",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<FaultKind> for Error {
    fn from(e: FaultKind) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Uplink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// The outbound queue is full; the message was dropped.
    QueueFull,
    /// The transport is not connected.
    NotConnected,
    /// The remote end rejected or never answered the request.
    SendFailed,
    /// The payload could not be encoded.
    Encode,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::NotConnected => write!(f, "transport not connected"),
            Self::SendFailed => write!(f, "send failed"),
            Self::Encode => write!(f, "payload encoding failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Shorthand used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
