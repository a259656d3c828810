//! Fuzz target: `MotionDetector::process`
//!
//! Feeds arbitrary accelerometer readings (including NaN and infinities)
//! and asserts the detector never panics and never reports two events
//! from one sample.
//!
//! cargo fuzz run fuzz_motion

#![no_main]

use evbms::config::BmsConfig;
use evbms::frame::AccelSample;
use evbms::motion::{MotionDetector, MotionThresholds};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut det = MotionDetector::new(MotionThresholds::from(&BmsConfig::default()));
    let mut t = 0u64;

    for chunk in data.chunks_exact(13) {
        let axis = |o: usize| f32::from_le_bytes([chunk[o], chunk[o + 1], chunk[o + 2], chunk[o + 3]]);
        t += u64::from(chunk[12]);
        let ev = det.process(&AccelSample::new(axis(0), axis(4), axis(8), t));
        assert!(!(ev.impact && ev.shock), "impact and shock from one sample");
    }
});
