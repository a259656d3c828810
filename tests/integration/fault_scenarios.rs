//! End-to-end fault latch, recovery and interlock scenarios.

use evbms::app::commands::AppCommand;
use evbms::app::events::{Alert, AlertKind, AppEvent};
use evbms::error::FaultKind;
use evbms::frame::{AccelSample, GpsFix, SensorFrame};
use evbms::persist;

use crate::mock_hw::{Bench, pack};

fn fault_latched(kind: FaultKind) -> impl Fn(&Alert) -> bool {
    move |a| matches!(a, Alert::FaultLatched { kind: k, .. } if *k == kind)
}

// ── Over-voltage ──────────────────────────────────────────────

#[test]
fn over_voltage_latches_and_cuts_motor() {
    let mut b = Bench::start(pack(11.1));
    b.tick();
    assert!(!b.svc.is_faulted());

    b.board.set_frame(pack(13.0));
    b.tick();

    assert!(b.svc.is_faulted());
    let record = b.svc.fault_record();
    assert_eq!(record.severity, 4);
    assert_eq!(record.message.as_str(), "OVER VOLTAGE");
    assert_eq!(b.board.motor(), Some(false));
    assert!(!b.svc.outputs().motor);

    assert_eq!(b.uplink.count(fault_latched(FaultKind::OverVoltage)), 1);
    assert_eq!(
        b.uplink.sms.iter().filter(|a| fault_latched(FaultKind::OverVoltage)(a)).count(),
        1
    );
    assert_eq!(persist::fault_count(&b.nvs), 1);
}

#[test]
fn persisting_condition_alerts_once() {
    let mut b = Bench::start(pack(11.1));
    b.board.set_frame(pack(13.0));
    b.ticks(20);

    assert_eq!(b.uplink.count(fault_latched(FaultKind::OverVoltage)), 1);
    assert_eq!(b.events(|e| matches!(e, AppEvent::FaultLatched { .. })), 1);
    assert_eq!(persist::fault_count(&b.nvs), 1);
}

#[test]
fn over_voltage_recovers_only_below_hysteresis_band() {
    let mut b = Bench::start(pack(11.1));
    b.board.set_frame(pack(13.0));
    b.tick();
    assert!(b.svc.is_faulted());

    // Below the trip point but inside the 0.1 V margin.
    b.board.set_frame(pack(12.7));
    b.ticks(5);
    assert!(b.svc.is_faulted());
    assert!(!b.svc.outputs().motor);

    b.board.set_frame(pack(12.0));
    b.tick();
    assert!(!b.svc.is_faulted());
    assert!(b.svc.outputs().motor);
    assert_eq!(b.board.motor(), Some(true));
    assert_eq!(b.uplink.count(|a| matches!(a, Alert::FaultsRecovered)), 1);
    assert_eq!(b.svc.fault_record().message.as_str(), "NONE");
}

#[test]
fn offline_uplink_does_not_weaken_interlock() {
    let mut b = Bench::start(pack(11.1));
    b.uplink.offline = true;
    b.board.set_frame(pack(13.0));
    b.tick();

    assert!(b.svc.is_faulted());
    assert_eq!(b.board.motor(), Some(false));
    assert_eq!(
        b.events(|e| matches!(e, AppEvent::AlertDropped(AlertKind::Fault))),
        1
    );
}

// ── Manual-clear faults ───────────────────────────────────────

#[test]
fn imbalance_stays_latched_until_operator_clear() {
    let mut b = Bench::start(pack(11.1));
    let mut unbalanced = pack(11.1);
    unbalanced.cell_imbalance_v = 0.3;
    b.board.set_frame(unbalanced);
    b.tick();
    assert!(b.svc.is_faulted());
    assert_eq!(b.svc.fault_record().message.as_str(), "CELL IMBALANCE");

    b.board.set_frame(pack(11.1));
    b.ticks(25);
    assert!(b.svc.is_faulted(), "imbalance never auto-recovers");
    assert!(!b.svc.outputs().motor);

    b.command(AppCommand::ClearFaults).unwrap();
    b.tick();
    assert!(!b.svc.is_faulted());
    assert!(b.svc.outputs().motor);
    assert_eq!(b.board.motor(), Some(true));
    assert_eq!(b.events(|e| matches!(e, AppEvent::FaultsClearedManually)), 1);
}

#[test]
fn external_trigger_raises_severity_floor() {
    let mut b = Bench::start(pack(11.1));
    b.command(AppCommand::TriggerExternal(FaultKind::CommunicationLoss))
        .unwrap();

    assert!(b.svc.is_faulted());
    assert!(b.svc.fault_record().severity >= 3);
    assert_eq!(b.board.motor(), Some(false));
    assert_eq!(b.uplink.count(fault_latched(FaultKind::CommunicationLoss)), 1);
}

// ── Collaborator-reported faults ──────────────────────────────

#[test]
fn impact_after_free_fall_latches_and_alerts() {
    let mut b = Bench::start(pack(11.1));
    let mut frame = pack(11.1);
    for t in [150, 160, 170] {
        frame.accel.push(AccelSample::new(0.0, 0.0, 0.1, t)).unwrap();
    }
    frame.accel.push(AccelSample::new(0.0, 0.0, 3.0, 200)).unwrap();
    b.board.set_frame(frame);
    b.tick();

    assert!(b.svc.is_faulted());
    assert_eq!(b.events(|e| matches!(e, AppEvent::FreeFall)), 1);
    assert_eq!(b.events(|e| matches!(e, AppEvent::Impact { .. })), 1);
    assert_eq!(b.uplink.count(fault_latched(FaultKind::ImpactDetected)), 1);
    assert_eq!(
        b.uplink.count(|a| matches!(a, Alert::Impact { impact_count: 1, .. })),
        1
    );
    assert_eq!(b.uplink.sms.len(), 2);
    assert!(!b.svc.outputs().motor);
}

#[test]
fn low_samples_without_landing_do_nothing() {
    let mut b = Bench::start(pack(11.1));
    let mut frame = pack(11.1);
    frame.accel.push(AccelSample::new(0.0, 0.0, 0.1, 150)).unwrap();
    frame.accel.push(AccelSample::new(0.0, 0.0, 0.1, 160)).unwrap();
    frame.accel.push(AccelSample::new(0.0, 0.0, 1.0, 170)).unwrap();
    b.board.set_frame(frame);
    b.ticks(3);

    assert!(!b.svc.is_faulted());
    assert_eq!(b.events(|e| matches!(e, AppEvent::FreeFall)), 0);
}

#[test]
fn leaving_the_geofence_latches_a_fault() {
    let mut b = Bench::start(pack(11.1));
    let mut frame = pack(11.1);
    frame.gps = Some(GpsFix {
        lat: 12.9816,
        lon: 77.5946,
    });
    b.board.set_frame(frame);
    b.ticks(3);

    assert!(b.svc.is_faulted());
    assert_eq!(b.uplink.count(fault_latched(FaultKind::GeofenceViolation)), 1);
    assert_eq!(b.uplink.count(|a| matches!(a, Alert::Geofence { .. })), 1);
    assert_eq!(b.events(|e| matches!(e, AppEvent::GeofenceViolation { .. })), 1);
}

#[test]
fn staying_outside_the_fence_does_not_mask_thermal_runaway() {
    let mut b = Bench::start(pack(11.1));
    let mut frame = pack(11.1);
    frame.gps = Some(GpsFix {
        lat: 12.9816,
        lon: 77.5946,
    });
    b.board.set_frame(frame.clone());
    b.ticks(3);
    assert_eq!(b.svc.fault_record().primary_fault, Some(FaultKind::GeofenceViolation));

    frame.temp_max_c = 66.0;
    b.board.set_frame(frame);
    b.ticks(4);

    let record = b.svc.fault_record();
    assert_eq!(record.primary_fault, Some(FaultKind::ThermalRunaway));
    assert_eq!(record.message.as_str(), "THERMAL RUNAWAY");
    assert_eq!(record.severity, 4);
}

#[test]
fn disarmed_geofence_ignores_position() {
    let mut b = Bench::start(pack(11.1));
    b.command(AppCommand::SetGeofenceEnabled(false)).unwrap();
    let mut frame: SensorFrame = pack(11.1);
    frame.gps = Some(GpsFix { lat: 13.5, lon: 78.0 });
    b.board.set_frame(frame);
    b.ticks(3);

    assert!(!b.svc.is_faulted());
    assert!(b.uplink.alerts.is_empty());
}
