//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BmsService (domain)
//! ```
//!
//! Driven adapters (sensor feed, relays, alert/telemetry uplink, event
//! sinks, storage) implement these traits. The
//! [`BmsService`](super::service::BmsService) consumes them via generics, so
//! the domain core never touches hardware directly.
//!
//! ## Notes
//!
//! - A [`ConfigPort`] refuses to persist a config that fails `BmsConfig::validate`.
//! - **AlertPort** / **TelemetryPort** must not block the control cycle for
//!   longer than a small bounded timeout; queueing adapters are preferred.
//! - All port errors are typed; callers must handle every variant explicitly.

use crate::config::BmsConfig;
use crate::error::{ActuatorError, CommsError, SensorError};
use crate::frame::SensorFrame;

use super::events::{Alert, AppEvent, TelemetryRecord};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: acquisition → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this once per cycle.
pub trait SensorPort {
    /// Latest converted measurements. Implementations return last-known
    /// values on their own transient failures.
    fn read_frame(&mut self, now_ms: u64) -> Result<SensorFrame, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the three protective relays.
pub trait RelayPort {
    fn set_charge(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_motor(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_fan(&mut self, on: bool) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Alert / telemetry ports (driven adapter: domain → radio / cloud)
// ───────────────────────────────────────────────────────────────

/// Alert delivery. Rate limiting lives in the domain; adapters just send.
pub trait AlertPort {
    /// Primary alert channel (messaging / cloud).
    fn send(&mut self, alert: &Alert) -> Result<(), CommsError>;

    /// Best-effort short-text channel (SMS).
    fn send_sms(&mut self, alert: &Alert) -> Result<(), CommsError>;
}

/// Fire-and-forget telemetry upload.
pub trait TelemetryPort {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / history)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Config port (BmsConfig ↔ flash)
// ───────────────────────────────────────────────────────────────

/// Where the operator-tunable [`BmsConfig`] lives between boots.
///
/// Out-of-range values come back as [`ConfigError::ValidationFailed`];
/// nothing is clamped on the way in.
pub trait ConfigPort {
    /// Returns [`BmsConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<BmsConfig, ConfigError>;

    /// Range-check `config`, then overwrite the stored copy.
    fn save(&self, config: &BmsConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (health scalars ↔ flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Every key lives under a namespace. A write replaces the whole value;
/// two keys are never updated together.
pub trait StoragePort {
    /// Copies the stored value into `buf` and returns its length.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replaces the value under `key`.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Removing a key that was never written is not an error.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing stored yet.
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// Names the field that is out of range.
    ValidationFailed(&'static str),
    StorageFull,
    /// Backend failure not covered above.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    /// Backend failure not covered above.
    IoError,
    /// Stored value has the wrong size or encoding.
    Corrupted,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "value corrupted"),
        }
    }
}
