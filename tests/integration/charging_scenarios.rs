//! Charge session, thermal trip and persistence scenarios.

use evbms::app::events::{Alert, AppEvent};
use evbms::config::BmsConfig;
use evbms::persist;
use evbms::relays::StopReason;

use crate::mock_hw::{Bench, pack};

fn ready_to_charge(a: &Alert) -> bool {
    matches!(a, Alert::ReadyToCharge { .. })
}

// ── Charge cycle ──────────────────────────────────────────────

#[test]
fn ready_to_charge_fires_once_per_session() {
    let mut b = Bench::start(pack(9.8));
    b.ticks(30);
    assert!(b.svc.outputs().charge);
    assert_eq!(b.board.charge(), Some(true));
    assert_eq!(b.uplink.count(ready_to_charge), 1);

    b.board.set_frame(pack(12.4));
    b.tick();
    assert!(!b.svc.outputs().charge);
    assert_eq!(b.svc.cycle_count(), 1);
    assert_eq!(
        b.uplink
            .count(|a| matches!(a, Alert::ChargeComplete { cycle_count: 1, .. })),
        1
    );
    assert_eq!(b.events(|e| matches!(e, AppEvent::ChargeCycleCompleted { cycle_count: 1 })), 1);

    b.ticks(10);
    assert_eq!(b.uplink.count(ready_to_charge), 1);

    b.board.set_frame(pack(9.8));
    b.tick();
    assert_eq!(b.uplink.count(ready_to_charge), 2);
    assert!(b.svc.outputs().charge);
}

#[test]
fn completed_cycle_survives_restart() {
    let mut b = Bench::start(pack(9.8));
    b.tick();
    b.board.set_frame(pack(12.4));
    b.tick();
    assert_eq!(persist::cycle_count(&b.nvs), 1);
    assert!(b.svc.health().soh < 100.0);

    let nvs = std::mem::take(&mut b.nvs);
    let restarted = Bench::start_with(BmsConfig::default(), nvs, pack(12.2));
    assert_eq!(restarted.svc.cycle_count(), 1);
    assert!(restarted.svc.health().soh < 100.0);
}

#[test]
fn fault_stops_an_active_session() {
    let mut b = Bench::start(pack(9.8));
    b.tick();
    assert!(b.svc.outputs().charge);

    let mut unbalanced = pack(9.8);
    unbalanced.cell_imbalance_v = 0.3;
    b.board.set_frame(unbalanced);
    b.tick();

    assert!(!b.svc.outputs().charge);
    assert!(!b.svc.outputs().motor);
    assert_eq!(
        b.uplink.count(|a| matches!(
            a,
            Alert::ChargingStopped {
                reason: StopReason::Fault
            }
        )),
        1
    );
    assert_eq!(b.svc.cycle_count(), 0);
}

#[test]
fn charging_current_blocks_motor() {
    let mut b = Bench::start(pack(11.1));
    let mut frame = pack(11.1);
    frame.current_a = -5.0;
    b.board.set_frame(frame);
    b.tick();
    assert!(!b.svc.outputs().motor);
    assert!(!b.svc.is_faulted());

    b.board.set_frame(pack(11.1));
    b.tick();
    assert!(b.svc.outputs().motor);
}

// ── Thermal ───────────────────────────────────────────────────

#[test]
fn thermal_trip_stops_charging_and_runs_fan() {
    let mut b = Bench::start(pack(9.8));
    b.tick();
    assert!(b.svc.outputs().charge);

    let mut hot = pack(9.8);
    hot.temp_max_c = 62.0;
    b.board.set_frame(hot);
    b.tick();

    let out = b.svc.outputs();
    assert!(!out.charge);
    assert!(!out.motor);
    assert!(out.fan);
    assert!(b.svc.relay_state().thermal_tripped);
    assert_eq!(b.uplink.count(|a| matches!(a, Alert::ThermalTrip { .. })), 1);
    assert_eq!(
        b.uplink.count(|a| matches!(
            a,
            Alert::ChargingStopped {
                reason: StopReason::ThermalTrip
            }
        )),
        1
    );
}

#[test]
fn thermal_trip_clears_below_fan_off_point() {
    let mut b = Bench::start(pack(11.1));
    let mut hot = pack(11.1);
    hot.temp_max_c = 62.0;
    b.board.set_frame(hot.clone());
    b.tick();
    assert!(b.svc.relay_state().thermal_tripped);

    hot.temp_max_c = 38.0;
    b.board.set_frame(hot);
    b.ticks(3);
    assert!(b.svc.relay_state().thermal_tripped);

    b.board.set_frame(pack(11.1));
    b.tick();
    assert!(!b.svc.relay_state().thermal_tripped);
    assert_eq!(b.uplink.count(|a| matches!(a, Alert::ThermalClear { .. })), 1);
    assert!(!b.svc.outputs().fan);
}

#[test]
fn warm_pack_runs_fan_with_hysteresis() {
    let mut b = Bench::start(pack(11.1));
    let mut warm = pack(11.1);
    warm.temp_max_c = 41.0;
    b.board.set_frame(warm.clone());
    b.tick();
    assert!(b.svc.outputs().fan);

    warm.temp_max_c = 37.0;
    b.board.set_frame(warm);
    b.tick();
    assert!(b.svc.outputs().fan, "fan holds inside the band");

    b.board.set_frame(pack(11.1));
    b.tick();
    assert!(!b.svc.outputs().fan);
    assert!(!b.svc.is_faulted());
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn telemetry_reflects_relay_and_fault_state() {
    let mut b = Bench::start(pack(9.8));
    b.ticks(50);

    assert_eq!(b.uplink.telemetry.len(), 1);
    let record = &b.uplink.telemetry[0];
    assert!(record.charging);
    assert!(record.motor);
    assert!(!record.fault_latched);
    assert_eq!(record.fault.as_str(), "NONE");
    assert_eq!(record.uptime_ms, 10_000);
}
