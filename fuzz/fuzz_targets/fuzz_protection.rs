//! Fuzz target: `FaultEngine` + `RelayController`
//!
//! Decodes arbitrary bytes into a stream of measurements and runs the
//! fault → recovery → relay sequence the control loop runs, asserting the
//! motor interlock after every step.
//!
//! cargo fuzz run fuzz_protection

#![no_main]

use evbms::config::BmsConfig;
use evbms::frame::SensorFrame;
use evbms::relays::{RelayController, RelayInputs};
use evbms::safety::FaultEngine;
use libfuzzer_sys::fuzz_target;

fn scaled(b: u8, lo: f32, hi: f32) -> f32 {
    lo + f32::from(b) / 255.0 * (hi - lo)
}

fuzz_target!(|data: &[u8]| {
    let cfg = BmsConfig::default();
    let mut faults = FaultEngine::new(&cfg);
    let mut relays = RelayController::new(&cfg);

    for (i, chunk) in data.chunks_exact(6).enumerate() {
        let now = i as u64 * 200;
        let mut frame = SensorFrame::nominal(scaled(chunk[0], 6.0, 15.0), 3);
        frame.cell_imbalance_v = scaled(chunk[1], 0.0, 0.5);
        frame.current_a = scaled(chunk[2], -60.0, 90.0);
        frame.temp_max_c = scaled(chunk[3], -20.0, 90.0);
        frame.temp_min_c = frame.temp_max_c - scaled(chunk[4], 0.0, 10.0);
        frame.overcurrent = chunk[5] & 1 == 1;

        if chunk[5] & 0x80 != 0 {
            faults.clear();
        }
        if !relays.in_inrush_blanking(now) {
            faults.evaluate(&frame, now);
        }
        faults.auto_check_recovery(&frame);

        let decision = relays.evaluate(
            RelayInputs {
                pack_v: frame.pack_v,
                current_a: frame.current_a,
                temp_c: frame.temp_max_c,
                fault: faults.is_latched(),
            },
            now,
        );

        assert!(!faults.is_latched() || !decision.motor, "motor on while latched");
        assert!(!decision.charge || !relays.state().thermal_tripped);
        assert!(faults.is_latched() || faults.faults().is_empty());
    }
});
