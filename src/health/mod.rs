//! Battery health estimators: state of charge, state of health and
//! remaining useful life.
//!
//! Each estimator owns its own fields of [`BatteryHealth`] and its own
//! persisted keys; RUL reads SOH and the durable cycle count as inputs.

pub mod rul;
pub mod soc;
pub mod soh;

pub use rul::{RulEstimate, RulEstimator};
pub use soc::SocEstimator;
pub use soh::SohEstimator;

/// Point-in-time view across the three estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryHealth {
    pub soc: f32,
    pub remaining_ah: f32,
    pub soh: f32,
    pub total_high_temp_s: u64,
    pub rul_cycles: i32,
    pub rul_hours: u64,
    pub rul_percent: f32,
}

impl BatteryHealth {
    pub fn collect(soc: &SocEstimator, soh: &SohEstimator, rul: &RulEstimator) -> Self {
        let est = rul.estimate();
        Self {
            soc: soc.soc(),
            remaining_ah: soc.remaining_ah(),
            soh: soh.soh(),
            total_high_temp_s: soh.high_temp_seconds(),
            rul_cycles: est.cycles,
            rul_hours: est.hours,
            rul_percent: est.percent,
        }
    }
}
