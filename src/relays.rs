//! Charge / thermal / motor relay controller.
//!
//! Three coupled state machines evaluated once per cycle, **in order**:
//!
//! 1. **Thermal** – `Normal ⇄ Tripped`, plus the fan hysteresis band.
//! 2. **Charging** – `Idle ⇄ Active`, gated by fault and thermal trip.
//! 3. **Motor** – combinational interlock with switch-on edge detection.
//!
//! Thermal runs first so a trip is visible to charging control in the same
//! cycle. The controller only decides; the caller writes the relays and
//! honours [`RelayController::in_inrush_blanking`].

use heapless::Vec;
use log::{info, warn};

use crate::config::BmsConfig;

/// Why a charging session was stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Fault,
    ThermalTrip,
}

/// One-time transition notices. All of them go out on the forced channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayAlert {
    ThermalTrip { temp_c: f32 },
    ThermalClear { temp_c: f32 },
    ChargingStopped { reason: StopReason },
    ReadyToCharge { pack_v: f32 },
    ChargeComplete { pack_v: f32 },
}

/// Live inputs for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct RelayInputs {
    pub pack_v: f32,
    /// Signed current, positive = discharge.
    pub current_a: f32,
    pub temp_c: f32,
    /// Fault engine latch.
    pub fault: bool,
}

/// Volatile relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayState {
    pub charging_active: bool,
    pub thermal_tripped: bool,
    pub fan_active: bool,
    pub motor_allowed: bool,
}

/// What the caller should drive this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayDecision {
    pub charge: bool,
    pub motor: bool,
    pub fan: bool,
    pub alerts: Vec<RelayAlert, 4>,
    /// A normal charge cycle finished (voltage reached the stop point).
    pub cycle_completed: bool,
    /// The motor relay went from off to on this cycle.
    pub motor_switched_on: bool,
}

#[derive(Debug, Clone, Copy)]
struct RelayThresholds {
    trip_temp_c: f32,
    clear_temp_c: f32,
    fan_on_temp_c: f32,
    fan_off_temp_c: f32,
    charge_start_v: f32,
    charge_stop_v: f32,
    charge_detect_a: f32,
    inrush_blanking_ms: u64,
}

impl From<&BmsConfig> for RelayThresholds {
    fn from(cfg: &BmsConfig) -> Self {
        Self {
            trip_temp_c: cfg.max_cell_temp_c,
            clear_temp_c: cfg.fan_off_temp_c,
            fan_on_temp_c: cfg.fan_on_temp_c,
            fan_off_temp_c: cfg.fan_off_temp_c,
            charge_start_v: cfg.charge_start_v(),
            charge_stop_v: cfg.charge_stop_v(),
            charge_detect_a: cfg.charge_detect_a,
            inrush_blanking_ms: u64::from(cfg.inrush_blanking_ms),
        }
    }
}

pub struct RelayController {
    limits: RelayThresholds,
    state: RelayState,
    blanking_until_ms: Option<u64>,
}

impl RelayController {
    /// Motor starts allowed; charge and fan start off.
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            limits: RelayThresholds::from(config),
            state: RelayState {
                charging_active: false,
                thermal_tripped: false,
                fan_active: false,
                motor_allowed: true,
            },
            blanking_until_ms: None,
        }
    }

    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.limits = RelayThresholds::from(config);
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// True while the motor switch-on transient should be ignored.
    pub fn in_inrush_blanking(&self, now_ms: u64) -> bool {
        self.blanking_until_ms.is_some_and(|until| now_ms < until)
    }

    /// Run thermal → charging → motor for one cycle.
    pub fn evaluate(&mut self, input: RelayInputs, now_ms: u64) -> RelayDecision {
        let mut alerts = Vec::new();
        let mut cycle_completed = false;

        self.update_thermal(input, &mut alerts);
        self.update_charging(input, &mut alerts, &mut cycle_completed);
        let motor_switched_on = self.update_motor(input, now_ms);

        RelayDecision {
            charge: self.state.charging_active,
            motor: self.state.motor_allowed,
            fan: self.state.fan_active,
            alerts,
            cycle_completed,
            motor_switched_on,
        }
    }

    // ── Thermal ───────────────────────────────────────────────

    fn update_thermal(&mut self, input: RelayInputs, alerts: &mut Vec<RelayAlert, 4>) {
        let l = self.limits;
        let t = input.temp_c;

        if !self.state.thermal_tripped && t >= l.trip_temp_c {
            self.state.thermal_tripped = true;
            self.state.motor_allowed = false;
            warn!("THERMAL: trip at {:.1}\u{00b0}C, charge and motor forced off", t);
            push_alert(alerts, RelayAlert::ThermalTrip { temp_c: t });
            if self.state.charging_active {
                self.state.charging_active = false;
                push_alert(alerts, RelayAlert::ChargingStopped {
                    reason: StopReason::ThermalTrip,
                });
            }
        } else if self.state.thermal_tripped && t < l.clear_temp_c {
            self.state.thermal_tripped = false;
            info!("THERMAL: cleared at {:.1}\u{00b0}C", t);
            push_alert(alerts, RelayAlert::ThermalClear { temp_c: t });
        }

        let fan = input.fault
            || self.state.thermal_tripped
            || t >= l.fan_on_temp_c
            || (self.state.fan_active && t >= l.fan_off_temp_c);
        if fan != self.state.fan_active {
            info!("FAN: {} (T={:.1}\u{00b0}C fault={})", if fan { "ON" } else { "OFF" }, t, input.fault);
            self.state.fan_active = fan;
        }
    }

    // ── Charging ──────────────────────────────────────────────

    fn update_charging(
        &mut self,
        input: RelayInputs,
        alerts: &mut Vec<RelayAlert, 4>,
        cycle_completed: &mut bool,
    ) {
        let l = self.limits;

        if input.fault || self.state.thermal_tripped {
            if self.state.charging_active {
                self.state.charging_active = false;
                let reason = if input.fault {
                    StopReason::Fault
                } else {
                    StopReason::ThermalTrip
                };
                warn!("CHARGE: stopped ({:?}), charge relay off", reason);
                push_alert(alerts, RelayAlert::ChargingStopped { reason });
            }
            return;
        }

        if !self.state.charging_active && input.pack_v <= l.charge_start_v {
            self.state.charging_active = true;
            info!("CHARGE: started at {:.2}V", input.pack_v);
            push_alert(alerts, RelayAlert::ReadyToCharge {
                pack_v: input.pack_v,
            });
        } else if self.state.charging_active && input.pack_v >= l.charge_stop_v {
            self.state.charging_active = false;
            *cycle_completed = true;
            info!("CHARGE: complete at {:.2}V", input.pack_v);
            push_alert(alerts, RelayAlert::ChargeComplete {
                pack_v: input.pack_v,
            });
        }
    }

    // ── Motor ─────────────────────────────────────────────────

    fn update_motor(&mut self, input: RelayInputs, now_ms: u64) -> bool {
        let charging_current = input.current_a < -self.limits.charge_detect_a;
        let allowed = !input.fault && !self.state.thermal_tripped && !charging_current;
        let switched_on = allowed && !self.state.motor_allowed;

        if switched_on {
            self.blanking_until_ms = Some(now_ms + self.limits.inrush_blanking_ms);
            info!("MOTOR: enabled, inrush blanking {}ms", self.limits.inrush_blanking_ms);
        } else if !allowed && self.state.motor_allowed {
            info!(
                "MOTOR: disabled (fault={} tripped={} charging={})",
                input.fault, self.state.thermal_tripped, charging_current
            );
        }
        self.state.motor_allowed = allowed;
        switched_on
    }
}

fn push_alert(alerts: &mut Vec<RelayAlert, 4>, alert: RelayAlert) {
    if alerts.push(alert).is_err() {
        warn!("RELAY: alert buffer full, dropping {:?}", alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RelayController {
        RelayController::new(&BmsConfig::default())
    }

    fn inputs(pack_v: f32, current_a: f32, temp_c: f32, fault: bool) -> RelayInputs {
        RelayInputs {
            pack_v,
            current_a,
            temp_c,
            fault,
        }
    }

    #[test]
    fn starts_with_motor_allowed() {
        let mut rc = controller();
        assert!(rc.state().motor_allowed);
        let d = rc.evaluate(inputs(11.1, 2.0, 25.0, false), 0);
        assert!(d.motor);
        assert!(!d.charge);
        assert!(!d.fan);
        assert!(!d.motor_switched_on);
        assert!(d.alerts.is_empty());
    }

    #[test]
    fn ready_to_charge_fires_once_per_transition() {
        let mut rc = controller();
        let d = rc.evaluate(inputs(9.8, 0.0, 25.0, false), 0);
        assert!(d.charge);
        assert_eq!(d.alerts.as_slice(), &[RelayAlert::ReadyToCharge { pack_v: 9.8 }]);
        for t in 1..5 {
            let d = rc.evaluate(inputs(9.8, 0.0, 25.0, false), t * 200);
            assert!(d.charge);
            assert!(d.alerts.is_empty());
        }
    }

    #[test]
    fn charge_completes_at_stop_voltage() {
        let mut rc = controller();
        rc.evaluate(inputs(9.8, 0.0, 25.0, false), 0);
        let d = rc.evaluate(inputs(12.4, -5.0, 25.0, false), 200);
        assert!(!d.charge);
        assert!(d.cycle_completed);
        assert_eq!(d.alerts.as_slice(), &[RelayAlert::ChargeComplete { pack_v: 12.4 }]);
    }

    #[test]
    fn fault_stops_charging_with_reason() {
        let mut rc = controller();
        rc.evaluate(inputs(9.8, 0.0, 25.0, false), 0);
        let d = rc.evaluate(inputs(9.8, 0.0, 25.0, true), 200);
        assert!(!d.charge);
        assert!(!d.motor);
        assert!(d.fan, "fan stays on during a fault");
        assert_eq!(
            d.alerts.as_slice(),
            &[RelayAlert::ChargingStopped {
                reason: StopReason::Fault
            }]
        );
        assert!(!d.cycle_completed);
    }

    #[test]
    fn no_charging_start_while_faulted() {
        let mut rc = controller();
        let d = rc.evaluate(inputs(9.0, 0.0, 25.0, true), 0);
        assert!(!d.charge);
        assert!(d.alerts.is_empty());
    }

    #[test]
    fn thermal_trip_cancels_charging_and_motor() {
        let mut rc = controller();
        rc.evaluate(inputs(9.8, 0.0, 25.0, false), 0);
        let d = rc.evaluate(inputs(9.8, 0.0, 60.0, false), 200);
        assert!(rc.state().thermal_tripped);
        assert!(!d.charge);
        assert!(!d.motor);
        assert!(d.fan);
        assert_eq!(
            d.alerts.as_slice(),
            &[
                RelayAlert::ThermalTrip { temp_c: 60.0 },
                RelayAlert::ChargingStopped {
                    reason: StopReason::ThermalTrip
                }
            ]
        );
    }

    #[test]
    fn thermal_clears_below_fan_off_temperature() {
        let mut rc = controller();
        rc.evaluate(inputs(11.1, 0.0, 61.0, false), 0);
        let d = rc.evaluate(inputs(11.1, 0.0, 40.0, false), 200);
        assert!(rc.state().thermal_tripped);
        assert!(d.alerts.is_empty());
        let d = rc.evaluate(inputs(11.1, 0.0, 34.9, false), 400);
        assert!(!rc.state().thermal_tripped);
        assert_eq!(d.alerts.as_slice(), &[RelayAlert::ThermalClear { temp_c: 34.9 }]);
        assert!(d.motor, "motor re-evaluates on its own once the trip clears");
        assert!(d.motor_switched_on);
    }

    #[test]
    fn fan_hysteresis_band() {
        let mut rc = controller();
        assert!(!rc.evaluate(inputs(11.1, 0.0, 38.0, false), 0).fan);
        assert!(rc.evaluate(inputs(11.1, 0.0, 40.0, false), 200).fan);
        assert!(rc.evaluate(inputs(11.1, 0.0, 36.0, false), 400).fan);
        assert!(rc.evaluate(inputs(11.1, 0.0, 35.0, false), 600).fan);
        assert!(!rc.evaluate(inputs(11.1, 0.0, 34.9, false), 800).fan);
        assert!(!rc.evaluate(inputs(11.1, 0.0, 38.0, false), 1000).fan);
    }

    #[test]
    fn charging_current_locks_out_motor() {
        let mut rc = controller();
        assert!(!rc.evaluate(inputs(11.1, -1.0, 25.0, false), 0).motor);
        // Small negative noise below the detect threshold is tolerated.
        assert!(rc.evaluate(inputs(11.1, -0.2, 25.0, false), 200).motor);
    }

    #[test]
    fn motor_switch_on_starts_inrush_blanking() {
        let mut rc = controller();
        rc.evaluate(inputs(11.1, 0.0, 25.0, true), 0);
        assert!(!rc.in_inrush_blanking(0));
        let d = rc.evaluate(inputs(11.1, 0.0, 25.0, false), 1_000);
        assert!(d.motor_switched_on);
        assert!(rc.in_inrush_blanking(1_000));
        assert!(rc.in_inrush_blanking(1_499));
        assert!(!rc.in_inrush_blanking(1_500));
        let d = rc.evaluate(inputs(11.1, 0.0, 25.0, false), 1_200);
        assert!(!d.motor_switched_on);
    }
}
