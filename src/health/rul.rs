//! Remaining-useful-life estimator.
//!
//! Three independent factors in `[0, 1]` (average pack voltage, average
//! temperature, cycles used) are combined as a weighted sum and scaled by
//! SOH. The replacement forecast is a separate linear extrapolation of
//! degradation per cycle.

use crate::config::BmsConfig;

/// Smoothing factor for the voltage and temperature averages.
const EMA_ALPHA: f32 = 0.1;
/// Days of notice below which the pack is flagged for replacement.
const REPLACEMENT_NOTICE_DAYS: u64 = 30;
/// One charge cycle per day is assumed for the hour and day estimates.
const HOURS_PER_CYCLE: u64 = 24;

/// Voltage factor from the ratio of average to nominal pack voltage.
pub fn voltage_factor(avg_pack_v: f32, nominal_pack_v: f32) -> f32 {
    let ratio = avg_pack_v / nominal_pack_v;
    if ratio >= 1.0 {
        1.0
    } else if ratio >= 0.95 {
        0.9
    } else if ratio >= 0.90 {
        0.7
    } else if ratio >= 0.85 {
        0.5
    } else {
        0.3
    }
}

/// Temperature factor: 1 inside 20–30 °C, linear decay outside.
pub fn temperature_factor(avg_temp_c: f32) -> f32 {
    if (20.0..=30.0).contains(&avg_temp_c) {
        1.0
    } else if avg_temp_c < 20.0 {
        (1.0 - (20.0 - avg_temp_c) * 0.01).clamp(0.7, 1.0)
    } else {
        (1.0 - (avg_temp_c - 30.0) * 0.03).clamp(0.2, 1.0)
    }
}

/// Fraction of rated cycles still unused.
pub fn cycle_factor(cycle_count: u64, max_cycles: u32) -> f32 {
    let max = u64::from(max_cycles);
    if max == 0 || cycle_count >= max {
        return 0.0;
    }
    1.0 - cycle_count as f32 / max as f32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RulEstimate {
    pub cycles: i32,
    pub hours: u64,
    pub percent: f32,
}

pub struct RulEstimator {
    avg_pack_v: f32,
    avg_temp_c: f32,
    estimate: RulEstimate,

    nominal_pack_v: f32,
    cycles_new: u32,
    w_voltage: f32,
    w_temp: f32,
    w_cycles: f32,
    soh_floor: f32,
}

impl RulEstimator {
    pub fn new(config: &BmsConfig) -> Self {
        let nominal_pack_v = config.nominal_pack_v();
        Self {
            avg_pack_v: nominal_pack_v,
            avg_temp_c: 25.0,
            estimate: RulEstimate {
                cycles: i32::try_from(config.rul_cycles_new).unwrap_or(i32::MAX),
                hours: 0,
                percent: 100.0,
            },
            nominal_pack_v,
            cycles_new: config.rul_cycles_new,
            w_voltage: config.rul_weight_voltage,
            w_temp: config.rul_weight_temp,
            w_cycles: config.rul_weight_cycles,
            soh_floor: config.soh_min_percent,
        }
    }

    /// Seed the estimate from a restored SOH before the first update.
    pub fn init(&mut self, soh: f32) {
        self.estimate.cycles = self.total_cycles(soh).min(i32::MAX as u64) as i32;
        self.estimate.percent = soh;
    }

    pub fn update(&mut self, pack_v: f32, temp_c: f32, soh: f32, cycle_count: u64) -> RulEstimate {
        self.avg_pack_v += EMA_ALPHA * (pack_v - self.avg_pack_v);
        self.avg_temp_c += EMA_ALPHA * (temp_c - self.avg_temp_c);

        let combined = (voltage_factor(self.avg_pack_v, self.nominal_pack_v) * self.w_voltage
            + temperature_factor(self.avg_temp_c) * self.w_temp
            + cycle_factor(cycle_count, self.cycles_new) * self.w_cycles)
            .clamp(0.0, 1.0);

        let remaining = self.total_cycles(soh).saturating_sub(cycle_count);
        let cycles = remaining.min(i32::MAX as u64) as i32;
        let hours = (remaining.saturating_mul(HOURS_PER_CYCLE) as f32 * combined) as u64;

        self.estimate = RulEstimate {
            cycles,
            hours,
            percent: (soh * combined).clamp(0.0, 100.0),
        };
        self.estimate
    }

    pub fn estimate(&self) -> RulEstimate {
        self.estimate
    }

    pub fn days(&self) -> u64 {
        self.estimate.hours / HOURS_PER_CYCLE
    }

    /// Days until SOH reaches the replacement floor at the historical
    /// degradation rate. `Some(0)` once at or below the floor; `None` while
    /// no degradation has been observed.
    pub fn predict_replacement_days(&self, soh: f32, cycle_count: u64) -> Option<u64> {
        if soh <= self.soh_floor {
            return Some(0);
        }
        let cycles = cycle_count.max(1) as f32;
        let per_cycle = (100.0 - soh) / cycles;
        if per_cycle <= 0.0 {
            return None;
        }
        Some(((soh - self.soh_floor) / per_cycle) as u64)
    }

    pub fn replacement_needed(&self, soh: f32, cycle_count: u64) -> bool {
        soh <= self.soh_floor
            || self
                .predict_replacement_days(soh, cycle_count)
                .is_some_and(|d| d <= REPLACEMENT_NOTICE_DAYS)
    }

    fn total_cycles(&self, soh: f32) -> u64 {
        (self.cycles_new as f32 * soh / 100.0).max(0.0) as u64
    }
}
