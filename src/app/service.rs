//! Application service: the hexagonal core.
//!
//! [`BmsService`] owns every domain component and runs one supervisory
//! cycle per [`tick`](BmsService::tick). All I/O flows through port traits
//! injected at call sites, making the entire service testable with mock
//! adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │          BmsService           │
//!   RelayPort ◀── │ Motion · Faults · Relays      │ ──▶ AlertPort
//!                 │ SOC · SOH · RUL · Analytics   │ ──▶ TelemetryPort
//! StoragePort ◀──▶└──────────────────────────────┘
//! ```
//!
//! Cycle order: sensors → motion → faults → external events → recovery →
//! relays → health → analytics → telemetry. The motor cut on a new fault
//! latch is written before anything else in the cycle can observe the
//! relay state.

use log::{debug, error, info, warn};

use crate::analytics::{AnalyticsSnapshot, EdgeAnalytics};
use crate::config::BmsConfig;
use crate::error::{ActuatorError, Error, FaultKind, Result};
use crate::frame::{GpsFix, SensorFrame};
use crate::geofence::GeofenceMonitor;
use crate::health::{BatteryHealth, RulEstimator, SocEstimator, SohEstimator};
use crate::motion::{MotionDetector, MotionSummary, MotionThresholds};
use crate::persist;
use crate::relays::{RelayAlert, RelayController, RelayInputs, RelayState};
use crate::safety::{FaultEngine, FaultRecord, FaultTransition, FaultUpdate};

use super::alerts::{AlertDispatcher, Dispatch};
use super::commands::AppCommand;
use super::events::{Alert, AppEvent, Relay, TelemetryRecord};
use super::ports::{AlertPort, ConfigPort, EventSink, RelayPort, SensorPort, StoragePort, TelemetryPort};

const SOC_LOW_PERCENT: f32 = 20.0;
const SOC_CRITICAL_PERCENT: f32 = 10.0;
/// Config changes are flushed this long after the last edit.
const CONFIG_SAVE_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SocLevel {
    Normal,
    Low,
    Critical,
}

impl SocLevel {
    fn of(soc: f32) -> Self {
        if soc < SOC_CRITICAL_PERCENT {
            Self::Critical
        } else if soc < SOC_LOW_PERCENT {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

/// Last state actually written to each relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutputs {
    pub charge: bool,
    pub motor: bool,
    pub fan: bool,
}

// ───────────────────────────────────────────────────────────────
// BmsService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct BmsService {
    config: BmsConfig,

    motion: MotionDetector,
    faults: FaultEngine,
    relays: RelayController,
    soc: SocEstimator,
    soh: SohEstimator,
    rul: RulEstimator,
    geofence: GeofenceMonitor,
    analytics: EdgeAnalytics,
    alerts: AlertDispatcher,

    outputs: RelayOutputs,
    frame: SensorFrame,
    last_fix: Option<GpsFix>,
    cycle_count: u64,
    charge_start_soc: Option<f32>,

    started_ms: u64,
    last_tick_ms: u64,
    last_telemetry_ms: u64,
    tick_count: u64,

    soc_level: SocLevel,
    outside_fence: bool,
    replacement_flagged: bool,

    config_dirty: bool,
    dirty_since_ms: u64,
    save_requested: bool,
}

impl BmsService {
    /// Construct the service from configuration.
    ///
    /// Does **not** touch hardware or storage; call [`start`](Self::start)
    /// next.
    pub fn new(config: BmsConfig) -> Self {
        let frame = SensorFrame::nominal(config.nominal_pack_v(), config.cell_count);
        Self {
            motion: MotionDetector::new(MotionThresholds::from(&config)),
            faults: FaultEngine::new(&config),
            relays: RelayController::new(&config),
            soc: SocEstimator::new(&config),
            soh: SohEstimator::new(&config),
            rul: RulEstimator::new(&config),
            geofence: GeofenceMonitor::new(&config),
            analytics: EdgeAnalytics::new(&config),
            alerts: AlertDispatcher::new(&config),
            outputs: RelayOutputs {
                charge: false,
                motor: true,
                fan: false,
            },
            frame,
            last_fix: None,
            cycle_count: 0,
            charge_start_soc: None,
            started_ms: 0,
            last_tick_ms: 0,
            last_telemetry_ms: 0,
            tick_count: 0,
            soc_level: SocLevel::Normal,
            outside_fence: false,
            replacement_flagged: false,
            config_dirty: false,
            dirty_since_ms: 0,
            save_requested: false,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Restore persisted health state, seed SOC from the first frame and
    /// drive the boot relay states (charge off, motor on, fan off).
    pub fn start<H>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        store: &impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Result<()>
    where
        H: SensorPort + RelayPort,
    {
        let mut frame = hw.read_frame(now_ms)?;
        frame.current_a = self.config.normalize_current(frame.current_a);

        self.soc.init(store, frame.pack_v);
        self.soh.init(store, now_ms);
        self.rul.init(self.soh.soh());
        self.cycle_count = persist::cycle_count(store);
        self.soc_level = SocLevel::of(self.soc.soc());
        self.replacement_flagged = self.rul.replacement_needed(self.soh.soh(), self.cycle_count);

        hw.set_charge(false)?;
        hw.set_motor(true)?;
        hw.set_fan(false)?;

        self.last_fix = frame.gps;
        self.frame = frame;
        self.started_ms = now_ms;
        self.last_tick_ms = now_ms;
        self.last_telemetry_ms = now_ms;

        sink.emit(&AppEvent::Started {
            soc: self.soc.soc(),
            soh: self.soh.soh(),
        });
        info!(
            "BmsService started: SOC {:.1}% SOH {:.1}% cycles {}",
            self.soc.soc(),
            self.soh.soh(),
            self.cycle_count
        );
        Ok(())
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full supervisory cycle.
    ///
    /// `hw` satisfies **both** [`SensorPort`] and [`RelayPort`], and
    /// `uplink` both [`AlertPort`] and [`TelemetryPort`]. Communication and
    /// storage failures are logged and contained; only a missing sensor
    /// frame or a failed relay write is returned.
    pub fn tick<H, U>(
        &mut self,
        now_ms: u64,
        hw: &mut H,
        uplink: &mut U,
        store: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Result<()>
    where
        H: SensorPort + RelayPort,
        U: AlertPort + TelemetryPort,
    {
        self.tick_count += 1;
        let dt_ms = now_ms.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now_ms;
        let mut relay_err: Option<ActuatorError> = None;

        // 1. Sensors
        let mut frame = hw.read_frame(now_ms)?;
        frame.current_a = self.config.normalize_current(frame.current_a);
        if frame.gps.is_some() {
            self.last_fix = frame.gps;
        }

        // 2. Motion
        let motion = self.motion.process_batch(frame.accel.iter());
        self.emit_motion(motion, sink);

        // 3. Faults, suppressed during the motor switch-on transient
        if self.relays.in_inrush_blanking(now_ms) {
            debug!("FAULT: evaluation blanked (motor inrush)");
        } else {
            let update = self.faults.evaluate(&frame, now_ms);
            self.apply_fault_update(update, hw, uplink, store, sink, &mut relay_err);
        }

        // 4. External events
        if motion.impact || motion.shock {
            let update =
                self.faults
                    .trigger_external(FaultKind::ImpactDetected, FaultKind::ImpactDetected.label(), now_ms);
            self.apply_fault_update(update, hw, uplink, store, sink, &mut relay_err);
            let st = self.motion.state();
            let alert = Alert::Impact {
                peak_g: motion.peak_g,
                impact_count: st.impact_count,
                shock_count: st.shock_count,
                position: self.last_fix,
            };
            self.dispatch_normal(&alert, now_ms, uplink, sink);
        }
        self.check_geofence(&frame, now_ms, hw, uplink, store, sink, &mut relay_err);

        // 5. Auto-recovery
        let update = self.faults.auto_check_recovery(&frame);
        self.apply_fault_update(update, hw, uplink, store, sink, &mut relay_err);

        // 6. Relays
        let fault = self.faults.is_latched();
        let charging_before = self.relays.state().charging_active;
        let decision = self.relays.evaluate(
            RelayInputs {
                pack_v: frame.pack_v,
                current_a: frame.current_a,
                temp_c: frame.temp_max_c,
                fault,
            },
            now_ms,
        );
        if !charging_before && decision.charge {
            self.charge_start_soc = Some(self.soc.soc());
        } else if charging_before && !decision.charge && !decision.cycle_completed {
            self.charge_start_soc = None;
        }
        let target = RelayOutputs {
            charge: decision.charge,
            motor: decision.motor && self.faults.motor_permitted(),
            fan: decision.fan,
        };
        self.drive(target, hw, sink, &mut relay_err);

        if decision.cycle_completed {
            self.complete_charge_cycle(now_ms, store, sink);
        }
        for relay_alert in &decision.alerts {
            let alert = self.relay_alert(*relay_alert);
            self.dispatch_forced(&alert, uplink, sink);
        }

        // 7. Health
        self.soc.update(frame.current_a, dt_ms);
        self.soc.correct_from_voltage(frame.pack_v);
        self.soh.update(frame.temp_max_c, fault, now_ms);
        self.rul
            .update(frame.pack_v, frame.temp_max_c, self.soh.soh(), self.cycle_count);
        self.soc.save_if_due(store, now_ms);
        self.soh.save_if_due(store, now_ms);
        self.check_health_levels(now_ms, uplink, sink);

        // 8. Analytics
        let snap = self.analytics.update(frame.pack_v, frame.current_a, frame.temp_max_c);
        if snap.anomaly {
            let alert = Alert::Anomaly {
                score: snap.anomaly_score,
            };
            self.dispatch_normal(&alert, now_ms, uplink, sink);
        } else if snap.trend_warning {
            debug!("ANALYTICS: trend warning (score {})", snap.anomaly_score);
        }

        self.frame = frame;

        // 9. Telemetry
        if now_ms.saturating_sub(self.last_telemetry_ms) >= u64::from(self.config.telemetry_interval_ms) {
            self.last_telemetry_ms = now_ms;
            let record = self.telemetry(now_ms);
            if let Err(e) = uplink.publish(&record) {
                warn!("TELEMETRY: publish failed ({})", e);
            }
            sink.emit(&AppEvent::Telemetry(record));
        }

        match relay_err {
            Some(e) => Err(Error::Actuator(e)),
            None => Ok(()),
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an operator or watchdog command.
    pub fn handle_command<R, U>(
        &mut self,
        cmd: AppCommand,
        now_ms: u64,
        hw: &mut R,
        uplink: &mut U,
        store: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Result<()>
    where
        R: RelayPort,
        U: AlertPort,
    {
        match cmd {
            AppCommand::ClearFaults => {
                self.faults.clear();
                sink.emit(&AppEvent::FaultsClearedManually);
                info!("Faults cleared by operator; motor re-evaluated next cycle");
            }
            AppCommand::ResetSoc(percent) => {
                self.soc.reset(percent, store, now_ms)?;
                self.soc_level = SocLevel::of(percent);
            }
            AppCommand::ResetSoh => {
                self.soh.reset(store, now_ms)?;
                self.rul.init(self.soh.soh());
                self.replacement_flagged = false;
            }
            AppCommand::SetGeofenceHome { lat, lon } => {
                self.geofence.set_home(GpsFix { lat, lon });
                self.config.home_lat = lat;
                self.config.home_lon = lon;
                self.outside_fence = false;
                self.mark_config_dirty(now_ms);
                info!("Geofence home set to {:.5},{:.5}", lat, lon);
            }
            AppCommand::SetGeofenceEnabled(enabled) => {
                self.geofence.set_enabled(enabled);
                self.config.geofence_enabled = enabled;
                self.outside_fence = false;
                self.mark_config_dirty(now_ms);
                info!("Geofence {}", if enabled { "armed" } else { "disarmed" });
            }
            AppCommand::TriggerExternal(kind) => {
                let update = self.faults.trigger_external(kind, kind.label(), now_ms);
                let mut relay_err = None;
                self.apply_fault_update(update, hw, uplink, store, sink, &mut relay_err);
                if let Some(e) = relay_err {
                    return Err(Error::Actuator(e));
                }
            }
            AppCommand::UpdateConfig(new_config) => {
                new_config.validate().map_err(Error::Config)?;
                self.apply_config(new_config);
                self.mark_config_dirty(now_ms);
                info!("Configuration updated at runtime");
            }
            AppCommand::SaveState => {
                self.soc.save(store, now_ms)?;
                self.soh.save(store, now_ms)?;
                if self.config_dirty {
                    self.save_requested = true;
                }
                info!("State checkpoint written");
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a telemetry record from the latest cycle.
    pub fn telemetry(&self, now_ms: u64) -> TelemetryRecord {
        let f = &self.frame;
        let record = self.faults.record();
        let relays = self.relays.state();
        let rul = self.rul.estimate();
        let motion = self.motion.state();
        TelemetryRecord {
            uptime_ms: now_ms.saturating_sub(self.started_ms),
            pack_v: f.pack_v,
            cell_min_v: f.cell_min_v,
            cell_max_v: f.cell_max_v,
            cell_imbalance_v: f.cell_imbalance_v,
            current_a: f.current_a,
            temp_max_c: f.temp_max_c,
            temp_min_c: f.temp_min_c,
            soc: self.soc.soc(),
            remaining_ah: self.soc.remaining_ah(),
            soh: self.soh.soh(),
            rul_cycles: rul.cycles,
            rul_hours: rul.hours,
            rul_percent: rul.percent,
            replacement_needed: self.rul.replacement_needed(self.soh.soh(), self.cycle_count),
            charging: self.outputs.charge,
            motor: self.outputs.motor,
            fan: self.outputs.fan,
            thermal_tripped: relays.thermal_tripped,
            fault_latched: record.latched,
            fault: record.message.clone(),
            fault_severity: record.severity,
            fault_count: record.fault_count,
            fault_bits: self.faults.faults().bits(),
            lat: self.last_fix.map(|p| p.lat),
            lon: self.last_fix.map(|p| p.lon),
            impact_count: motion.impact_count,
            shock_count: motion.shock_count,
            anomaly_score: self.analytics.snapshot().anomaly_score,
            cycle_count: self.cycle_count,
        }
    }

    pub fn health(&self) -> BatteryHealth {
        BatteryHealth::collect(&self.soc, &self.soh, &self.rul)
    }

    pub fn fault_record(&self) -> &FaultRecord {
        self.faults.record()
    }

    pub fn is_faulted(&self) -> bool {
        self.faults.is_latched()
    }

    pub fn relay_state(&self) -> &RelayState {
        self.relays.state()
    }

    /// What was last written to the relays.
    pub fn outputs(&self) -> RelayOutputs {
        self.outputs
    }

    pub fn analytics(&self) -> AnalyticsSnapshot {
        self.analytics.snapshot()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The live configuration.
    pub fn config(&self) -> &BmsConfig {
        &self.config
    }

    // ── Internal: faults ──────────────────────────────────────

    fn apply_fault_update(
        &mut self,
        update: FaultUpdate,
        hw: &mut impl RelayPort,
        uplink: &mut impl AlertPort,
        store: &mut impl StoragePort,
        sink: &mut impl EventSink,
        relay_err: &mut Option<ActuatorError>,
    ) {
        match update.transition {
            FaultTransition::Latched(kind) => {
                // Hard interlock first.
                self.write_relay(Relay::Motor, false, hw, sink, relay_err);
                for raised in update.changed.iter() {
                    sink.emit(&AppEvent::FaultRaised(raised));
                }
                let severity = self.faults.severity();
                let total = persist::increment_fault_count(store);
                error!("FAULT LATCHED: {} (severity {}, lifetime {})", kind, severity, total);
                sink.emit(&AppEvent::FaultLatched { kind, severity });
                self.dispatch_forced(&Alert::FaultLatched { kind, severity }, uplink, sink);
            }
            FaultTransition::Recovered => {
                for cleared in update.changed.iter() {
                    sink.emit(&AppEvent::FaultCleared(cleared));
                }
                sink.emit(&AppEvent::FaultsRecovered);
                self.dispatch_forced(&Alert::FaultsRecovered, uplink, sink);
            }
            FaultTransition::None => {
                let event: fn(FaultKind) -> AppEvent = if self.faults.is_latched()
                    && update.changed.iter().all(|k| self.faults.is_fault_active(k))
                {
                    AppEvent::FaultRaised
                } else {
                    AppEvent::FaultCleared
                };
                for kind in update.changed.iter() {
                    sink.emit(&event(kind));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_geofence(
        &mut self,
        frame: &SensorFrame,
        now_ms: u64,
        hw: &mut impl RelayPort,
        uplink: &mut impl AlertPort,
        store: &mut impl StoragePort,
        sink: &mut impl EventSink,
        relay_err: &mut Option<ActuatorError>,
    ) {
        let Some(status) = self.geofence.check(frame.gps) else {
            return;
        };
        if !status.violated {
            self.outside_fence = false;
            return;
        }
        if !self.outside_fence {
            self.outside_fence = true;
            warn!("GEOFENCE: outside by {:.0} m", status.distance_m);
            sink.emit(&AppEvent::GeofenceViolation {
                distance_m: status.distance_m,
            });
        }
        let update = self.faults.trigger_external(
            FaultKind::GeofenceViolation,
            FaultKind::GeofenceViolation.label(),
            now_ms,
        );
        self.apply_fault_update(update, hw, uplink, store, sink, relay_err);
        if let Some(position) = frame.gps {
            let alert = Alert::Geofence {
                position,
                distance_m: status.distance_m,
            };
            self.dispatch_normal(&alert, now_ms, uplink, sink);
        }
    }

    // ── Internal: relays ──────────────────────────────────────

    fn drive(
        &mut self,
        target: RelayOutputs,
        hw: &mut impl RelayPort,
        sink: &mut impl EventSink,
        relay_err: &mut Option<ActuatorError>,
    ) {
        self.write_relay(Relay::Charge, target.charge, hw, sink, relay_err);
        self.write_relay(Relay::Motor, target.motor, hw, sink, relay_err);
        self.write_relay(Relay::Fan, target.fan, hw, sink, relay_err);
    }

    /// Write one relay if it differs from what was last written. A failed
    /// write leaves the cached state alone so the next cycle retries.
    fn write_relay(
        &mut self,
        relay: Relay,
        on: bool,
        hw: &mut impl RelayPort,
        sink: &mut impl EventSink,
        relay_err: &mut Option<ActuatorError>,
    ) {
        let current = match relay {
            Relay::Charge => &mut self.outputs.charge,
            Relay::Motor => &mut self.outputs.motor,
            Relay::Fan => &mut self.outputs.fan,
        };
        if *current == on {
            return;
        }
        let result = match relay {
            Relay::Charge => hw.set_charge(on),
            Relay::Motor => hw.set_motor(on),
            Relay::Fan => hw.set_fan(on),
        };
        match result {
            Ok(()) => {
                *current = on;
                sink.emit(&AppEvent::RelayChanged { relay, on });
            }
            Err(e) => {
                error!("RELAY: {:?} write failed ({})", relay, e);
                relay_err.get_or_insert(e);
            }
        }
    }

    fn relay_alert(&self, alert: RelayAlert) -> Alert {
        match alert {
            RelayAlert::ThermalTrip { temp_c } => Alert::ThermalTrip { temp_c },
            RelayAlert::ThermalClear { temp_c } => Alert::ThermalClear { temp_c },
            RelayAlert::ChargingStopped { reason } => Alert::ChargingStopped { reason },
            RelayAlert::ReadyToCharge { pack_v } => Alert::ReadyToCharge { pack_v },
            RelayAlert::ChargeComplete { pack_v } => Alert::ChargeComplete {
                pack_v,
                cycle_count: self.cycle_count,
            },
        }
    }

    /// Count the cycle, charge its depth of discharge to SOH, checkpoint.
    fn complete_charge_cycle(&mut self, now_ms: u64, store: &mut impl StoragePort, sink: &mut impl EventSink) {
        self.cycle_count = persist::increment_cycle_count(store);
        let start_soc = self.charge_start_soc.take().unwrap_or_else(|| self.soc.soc());
        self.soh.degrade_by_cycle((100.0 - start_soc).clamp(0.0, 100.0));
        if let Err(e) = self.soc.save(store, now_ms) {
            warn!("SOC: checkpoint failed ({})", e);
        }
        if let Err(e) = self.soh.save(store, now_ms) {
            warn!("SOH: checkpoint failed ({})", e);
        }
        sink.emit(&AppEvent::ChargeCycleCompleted {
            cycle_count: self.cycle_count,
        });
    }

    // ── Internal: health and motion ───────────────────────────

    fn emit_motion(&self, motion: MotionSummary, sink: &mut impl EventSink) {
        if motion.free_fall {
            sink.emit(&AppEvent::FreeFall);
        }
        if motion.impact {
            sink.emit(&AppEvent::Impact { peak_g: motion.peak_g });
        }
        if motion.shock {
            sink.emit(&AppEvent::Shock { peak_g: motion.peak_g });
        }
    }

    fn check_health_levels(&mut self, now_ms: u64, uplink: &mut impl AlertPort, sink: &mut impl EventSink) {
        let soc = self.soc.soc();
        let level = SocLevel::of(soc);
        if level > self.soc_level {
            match level {
                SocLevel::Critical => sink.emit(&AppEvent::SocCritical { soc }),
                SocLevel::Low => sink.emit(&AppEvent::SocLow { soc }),
                SocLevel::Normal => {}
            }
        }
        self.soc_level = level;

        let soh = self.soh.soh();
        let needed = self.rul.replacement_needed(soh, self.cycle_count);
        if needed && !self.replacement_flagged {
            self.replacement_flagged = true;
            warn!("SOH: {:.1}%, pack replacement due", soh);
            sink.emit(&AppEvent::SohDegraded { soh });
            let alert = Alert::ReplacementDue {
                soh,
                days_left: self.rul.predict_replacement_days(soh, self.cycle_count),
            };
            self.dispatch_normal(&alert, now_ms, uplink, sink);
        } else if !needed {
            self.replacement_flagged = false;
        }
    }

    // ── Internal: alerts ──────────────────────────────────────

    fn dispatch_forced(&mut self, alert: &Alert, uplink: &mut impl AlertPort, sink: &mut impl EventSink) {
        if self.alerts.forced(alert, uplink) == Dispatch::Failed {
            sink.emit(&AppEvent::AlertDropped(alert.kind()));
        }
    }

    fn dispatch_normal(
        &mut self,
        alert: &Alert,
        now_ms: u64,
        uplink: &mut impl AlertPort,
        sink: &mut impl EventSink,
    ) {
        if self.alerts.normal(alert, now_ms, uplink) == Dispatch::Failed {
            sink.emit(&AppEvent::AlertDropped(alert.kind()));
        }
    }

    // ── Config ────────────────────────────────────────────────

    /// Push new thresholds into every component that can take them live.
    /// Pack capacity and cell count feed the estimators at construction
    /// and take effect after a restart.
    fn apply_config(&mut self, config: BmsConfig) {
        self.motion.set_thresholds(MotionThresholds::from(&config));
        self.faults.reconfigure(&config);
        self.relays.reconfigure(&config);
        self.geofence.reconfigure(&config);
        self.analytics.reconfigure(&config);
        self.alerts.reconfigure(&config);
        self.config = config;
    }

    fn mark_config_dirty(&mut self, now_ms: u64) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_ms = now_ms;
        }
    }

    /// Persist the config once it has been stable for a few seconds, or
    /// right away after [`AppCommand::SaveState`]. Returns `true` if saved.
    pub fn auto_save_if_needed(&mut self, now_ms: u64, storage: &impl ConfigPort) -> bool {
        if !self.config_dirty {
            return false;
        }
        if !self.save_requested && now_ms.saturating_sub(self.dirty_since_ms) < CONFIG_SAVE_DELAY_MS {
            return false;
        }
        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                self.save_requested = false;
                info!("Config saved to NVS");
                true
            }
            Err(e) => {
                warn!("Config save failed: {}", e);
                false
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }
}
