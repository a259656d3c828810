//! Fault engine.
//!
//! Runs **every cycle before the relay controller** and accumulates latched
//! faults in a [`FaultSet`]. Any set bit latches the pack; the service cuts
//! the motor relay in the same cycle the latch happens.
//!
//! ## Fault lifecycle
//!
//! 1. A measurement crosses a threshold ([`FaultEngine::evaluate`]) or a
//!    collaborator reports an external fault ([`FaultEngine::trigger_external`]).
//! 2. The engine sets the bit, bumps the counter and updates the primary
//!    fault. The first bit to set while clear reports
//!    [`FaultTransition::Latched`].
//! 3. Each cycle, [`FaultEngine::auto_check_recovery`] clears
//!    auto-recoverable bits whose condition has resolved with hysteresis.
//! 4. When the set becomes empty the engine reports
//!    [`FaultTransition::Recovered`]. Manual-clear kinds only leave through
//!    [`FaultEngine::clear`].

use heapless::String;
use log::{error, info, warn};

use crate::config::BmsConfig;
use crate::error::FaultKind;
use crate::frame::SensorFrame;

/// Fixed priority used to pick the primary fault, highest first.
pub const FAULT_PRIORITY: [FaultKind; 13] = [
    FaultKind::ThermalRunaway,
    FaultKind::OverTemperature,
    FaultKind::UnderTemperature,
    FaultKind::OverVoltage,
    FaultKind::UnderVoltage,
    FaultKind::OverCurrentCharge,
    FaultKind::OverCurrentDischarge,
    FaultKind::CellImbalance,
    FaultKind::ImpactDetected,
    FaultKind::GeofenceViolation,
    FaultKind::BatteryAging,
    FaultKind::SensorFailure,
    FaultKind::CommunicationLoss,
];

/// Severity reported by externally triggered faults.
pub const EXTERNAL_SEVERITY: u8 = 3;

const NO_FAULT_LABEL: &str = "NONE";

/// Severity contributed by a single fault kind (0..=4).
pub const fn severity_of(kind: FaultKind) -> u8 {
    match kind {
        FaultKind::OverVoltage
        | FaultKind::UnderVoltage
        | FaultKind::OverCurrentCharge
        | FaultKind::OverCurrentDischarge
        | FaultKind::OverTemperature
        | FaultKind::ThermalRunaway => 4,
        FaultKind::UnderTemperature | FaultKind::CellImbalance => 3,
        FaultKind::SensorFailure
        | FaultKind::CommunicationLoss
        | FaultKind::GeofenceViolation
        | FaultKind::ImpactDetected
        | FaultKind::BatteryAging => EXTERNAL_SEVERITY,
    }
}

// ── FaultSet ──────────────────────────────────────────────────

/// Set of independently tracked fault kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSet(u16);

impl FaultSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, kind: FaultKind) -> bool {
        self.0 & kind.mask() != 0
    }

    /// Set `kind`. Returns `true` if it was not already set.
    pub fn insert(&mut self, kind: FaultKind) -> bool {
        let newly = !self.contains(kind);
        self.0 |= kind.mask();
        newly
    }

    /// Clear `kind`. Returns `true` if it was set.
    pub fn remove(&mut self, kind: FaultKind) -> bool {
        let was = self.contains(kind);
        self.0 &= !kind.mask();
        was
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Raw bit view for telemetry.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Iterate set kinds in priority order.
    pub fn iter(self) -> impl Iterator<Item = FaultKind> {
        FAULT_PRIORITY.into_iter().filter(move |k| self.contains(*k))
    }

    /// Highest-priority kind currently set.
    pub fn highest_priority(self) -> Option<FaultKind> {
        self.iter().next()
    }
}

// ── FaultRecord ───────────────────────────────────────────────

/// Aggregate fault state exposed to the rest of the system.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub active: bool,
    /// `None` when no fault is set.
    pub primary_fault: Option<FaultKind>,
    pub fault_count: u32,
    pub latched: bool,
    pub message: String<63>,
    pub timestamp_ms: u64,
    pub severity: u8,
}

impl FaultRecord {
    fn cleared() -> Self {
        Self {
            active: false,
            primary_fault: None,
            fault_count: 0,
            latched: false,
            message: label_string(NO_FAULT_LABEL),
            timestamp_ms: 0,
            severity: 0,
        }
    }
}

/// Copy `text` into a fixed 63-byte message, truncating on a char
/// boundary.
fn label_string(text: &str) -> String<63> {
    let mut s = String::new();
    for c in text.chars() {
        if s.push(c).is_err() {
            break;
        }
    }
    s
}

// ── Transitions ───────────────────────────────────────────────

/// Change of the aggregate latch produced by one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTransition {
    /// The latch did not change.
    None,
    /// The pack went from clear to latched; carries the primary fault.
    Latched(FaultKind),
    /// Every bit cleared; the pack is no longer latched.
    Recovered,
}

/// Outcome of one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultUpdate {
    /// Bits set (evaluate / trigger) or cleared (recovery) by this call.
    pub changed: FaultSet,
    pub transition: FaultTransition,
}

impl FaultUpdate {
    const fn unchanged() -> Self {
        Self {
            changed: FaultSet::empty(),
            transition: FaultTransition::None,
        }
    }
}

// ── Thresholds ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct FaultThresholds {
    cell_max_v: f32,
    cell_min_v: f32,
    max_pack_v: f32,
    min_pack_v: f32,
    max_imbalance_v: f32,
    max_cell_temp_c: f32,
    min_cell_temp_c: f32,
    max_pack_temp_c: f32,
    voltage_margin_v: f32,
    temp_margin_c: f32,
}

impl From<&BmsConfig> for FaultThresholds {
    fn from(cfg: &BmsConfig) -> Self {
        Self {
            cell_max_v: cfg.cell_max_v,
            cell_min_v: cfg.cell_min_v,
            max_pack_v: cfg.max_pack_v(),
            min_pack_v: cfg.min_pack_v(),
            max_imbalance_v: cfg.max_imbalance_v,
            max_cell_temp_c: cfg.max_cell_temp_c,
            min_cell_temp_c: cfg.min_cell_temp_c,
            max_pack_temp_c: cfg.max_pack_temp_c,
            voltage_margin_v: cfg.voltage_recovery_margin_v,
            temp_margin_c: cfg.temp_recovery_margin_c,
        }
    }
}

// ── FaultEngine ───────────────────────────────────────────────

/// Latching fault state machine.
pub struct FaultEngine {
    limits: FaultThresholds,
    faults: FaultSet,
    record: FaultRecord,
}

impl FaultEngine {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            limits: FaultThresholds::from(config),
            faults: FaultSet::empty(),
            record: FaultRecord::cleared(),
        }
    }

    /// Pick up new thresholds without touching latched state.
    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.limits = FaultThresholds::from(config);
    }

    /// Check every condition family against one frame.
    ///
    /// `frame.current_a` must already follow the internal sign convention
    /// (positive = discharge).
    pub fn evaluate(&mut self, frame: &SensorFrame, now_ms: u64) -> FaultUpdate {
        let l = self.limits;
        let was_latched = self.record.latched;
        let mut changed = FaultSet::empty();

        // ── Voltage ───────────────────────────────────────────
        if frame.cell_max_v >= l.cell_max_v || frame.pack_v >= l.max_pack_v {
            self.raise(FaultKind::OverVoltage, &mut changed);
        }
        if frame.cell_min_v <= l.cell_min_v || frame.pack_v <= l.min_pack_v {
            self.raise(FaultKind::UnderVoltage, &mut changed);
        }

        // ── Balance ───────────────────────────────────────────
        if frame.cell_imbalance_v > l.max_imbalance_v {
            self.raise(FaultKind::CellImbalance, &mut changed);
        }

        // ── Current (sustain already enforced upstream) ───────
        if frame.overcurrent {
            let kind = if frame.current_a < 0.0 {
                FaultKind::OverCurrentCharge
            } else {
                FaultKind::OverCurrentDischarge
            };
            self.raise(kind, &mut changed);
        }

        // ── Temperature ───────────────────────────────────────
        if frame.temp_max_c >= l.max_cell_temp_c {
            self.raise(FaultKind::OverTemperature, &mut changed);
        }
        if frame.temp_min_c <= l.min_cell_temp_c {
            self.raise(FaultKind::UnderTemperature, &mut changed);
        }
        if frame.temp_max_c >= l.max_pack_temp_c {
            self.raise(FaultKind::ThermalRunaway, &mut changed);
        }

        self.finish_latch(was_latched, changed, now_ms)
    }

    /// Latch a fault reported by a collaborator (geofence, impact, watchdog).
    /// External faults always require a manual clear. Re-reporting a kind
    /// that is already set leaves the primary fault and message alone.
    pub fn trigger_external(&mut self, kind: FaultKind, message: &str, now_ms: u64) -> FaultUpdate {
        let was_latched = self.record.latched;
        let mut changed = FaultSet::empty();
        if self.faults.insert(kind) {
            changed.insert(kind);
            self.record.fault_count = self.record.fault_count.saturating_add(1);
            self.record.primary_fault = Some(kind);
            self.record.message = label_string(message);
            error!("FAULT SET: {kind} (external)");
        }
        self.record.severity = self.record.severity.max(EXTERNAL_SEVERITY);
        self.finish_latch(was_latched, changed, now_ms)
    }

    /// Clear auto-recoverable bits whose condition resolved with margin.
    /// No-op unless latched.
    pub fn auto_check_recovery(&mut self, frame: &SensorFrame) -> FaultUpdate {
        if !self.record.latched {
            return FaultUpdate::unchanged();
        }
        let l = self.limits;
        let mut changed = FaultSet::empty();

        let resolved = [
            (
                FaultKind::OverVoltage,
                frame.pack_v < l.max_pack_v - l.voltage_margin_v && frame.cell_max_v < l.cell_max_v,
            ),
            (
                FaultKind::UnderVoltage,
                frame.pack_v > l.min_pack_v + l.voltage_margin_v && frame.cell_min_v > l.cell_min_v,
            ),
            (FaultKind::OverCurrentCharge, !frame.overcurrent),
            (FaultKind::OverCurrentDischarge, !frame.overcurrent),
            (
                FaultKind::OverTemperature,
                frame.temp_max_c < l.max_cell_temp_c - l.temp_margin_c,
            ),
            (
                FaultKind::UnderTemperature,
                frame.temp_min_c > l.min_cell_temp_c + l.temp_margin_c,
            ),
        ];

        for (kind, ok) in resolved {
            if ok && self.faults.remove(kind) {
                changed.insert(kind);
                info!("FAULT CLEARED: {kind}");
            }
        }

        if changed.is_empty() {
            return FaultUpdate::unchanged();
        }

        if self.faults.is_empty() {
            let count = self.record.fault_count;
            self.record = FaultRecord::cleared();
            self.record.fault_count = count;
            info!("FAULT: all faults recovered, motor re-enabled");
            return FaultUpdate {
                changed,
                transition: FaultTransition::Recovered,
            };
        }

        self.refresh_primary();
        FaultUpdate {
            changed,
            transition: FaultTransition::None,
        }
    }

    /// Unconditionally reset every bit and the record. Operator action only.
    pub fn clear(&mut self) {
        if !self.faults.is_empty() {
            warn!("FAULT: manual clear of {} fault(s)", self.faults.len());
        }
        self.faults = FaultSet::empty();
        self.record = FaultRecord::cleared();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_latched(&self) -> bool {
        self.record.latched
    }

    /// Hard interlock: the motor may only run while nothing is latched.
    pub fn motor_permitted(&self) -> bool {
        !self.record.latched
    }

    pub fn faults(&self) -> FaultSet {
        self.faults
    }

    pub fn is_fault_active(&self, kind: FaultKind) -> bool {
        self.faults.contains(kind)
    }

    pub fn record(&self) -> &FaultRecord {
        &self.record
    }

    pub fn fault_reason(&self) -> &str {
        self.record.message.as_str()
    }

    pub fn severity(&self) -> u8 {
        self.record.severity
    }

    // ── Internal ──────────────────────────────────────────────

    fn raise(&mut self, kind: FaultKind, changed: &mut FaultSet) {
        if !self.faults.insert(kind) {
            return;
        }
        changed.insert(kind);
        self.record.fault_count = self.record.fault_count.saturating_add(1);
        self.record.primary_fault = Some(kind);
        self.record.message = label_string(kind.label());
        self.record.severity = self.record.severity.max(severity_of(kind));
        error!("FAULT SET: {kind}");
    }

    fn finish_latch(&mut self, was_latched: bool, changed: FaultSet, now_ms: u64) -> FaultUpdate {
        if was_latched || self.faults.is_empty() {
            return FaultUpdate {
                changed,
                transition: FaultTransition::None,
            };
        }
        self.record.active = true;
        self.record.latched = true;
        self.record.timestamp_ms = now_ms;
        let primary = self
            .record
            .primary_fault
            .or_else(|| self.faults.highest_priority())
            .unwrap_or(FaultKind::SensorFailure);
        error!(
            "FAULT LATCHED: {} (severity {}), motor cut",
            primary, self.record.severity
        );
        FaultUpdate {
            changed,
            transition: FaultTransition::Latched(primary),
        }
    }

    fn refresh_primary(&mut self) {
        if let Some(kind) = self.faults.highest_priority() {
            self.record.primary_fault = Some(kind);
            self.record.message = label_string(kind.label());
            self.record.severity = self.faults.iter().map(severity_of).max().unwrap_or(0);
        }
    }
}
