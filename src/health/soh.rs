//! State-of-health estimator.
//!
//! SOH only ever decreases and never goes below the configured floor.
//! Thermal stress is integrated over time, faults cost a fixed step once per
//! latch event, and the charge-cycle path applies a depth-of-discharge step.

use log::{debug, info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::BmsConfig;
use crate::error::Result;
use crate::persist::{KEY_HIGH_TEMP_S, KEY_SOH, KvStore};

const MS_PER_HOUR: f32 = 3_600_000.0;
/// `update` runs at most once per this interval.
const UPDATE_INTERVAL_MS: u64 = 1_000;

/// Thermal stress multiplier for a temperature in °C.
fn temp_factor(temp_c: f32) -> f32 {
    if temp_c < 25.0 {
        0.5
    } else if temp_c < 35.0 {
        1.0
    } else if temp_c < 45.0 {
        2.0
    } else if temp_c < 55.0 {
        4.0
    } else {
        8.0
    }
}

/// Cycle wear multiplier for a depth of discharge in %.
fn depth_factor(depth_pct: f32) -> f32 {
    if depth_pct < 20.0 {
        0.2
    } else if depth_pct < 50.0 {
        0.5
    } else if depth_pct < 80.0 {
        1.0
    } else {
        2.0
    }
}

/// SOH implied by a capacity measurement, clamped to 0–100 %.
pub fn soh_from_capacity(measured_ah: f32, nominal_ah: f32) -> f32 {
    if nominal_ah <= 0.0 {
        return 0.0;
    }
    (measured_ah / nominal_ah * 100.0).clamp(0.0, 100.0)
}

pub struct SohEstimator {
    soh: f32,
    high_temp_s: u64,
    /// Exposure below one whole second, carried into the next update.
    high_temp_rem_ms: u64,
    fault_seen: bool,
    last_update_ms: u64,
    last_save_ms: u64,

    floor: f32,
    per_fault: f32,
    per_cycle: f32,
    high_temp_rate: f32,
    high_temp_threshold_c: f32,
    rated_ah: f32,
    save_interval_ms: u64,
}

impl SohEstimator {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            soh: 100.0,
            high_temp_s: 0,
            high_temp_rem_ms: 0,
            fault_seen: false,
            last_update_ms: 0,
            last_save_ms: 0,
            floor: config.soh_min_percent,
            per_fault: config.soh_degrade_per_fault,
            per_cycle: config.soh_degrade_per_cycle,
            high_temp_rate: config.soh_degrade_high_temp,
            high_temp_threshold_c: config.high_temp_threshold_c,
            rated_ah: config.rated_capacity_ah,
            save_interval_ms: u64::from(config.soh_save_interval_ms),
        }
    }

    /// Restore SOH and the high-temperature exposure counter. Missing keys
    /// start a fresh pack.
    pub fn init(&mut self, store: &impl StoragePort, now_ms: u64) {
        self.soh = match store.get_f32(KEY_SOH) {
            Ok(v) if v.is_finite() => v.clamp(self.floor, 100.0),
            Ok(_) | Err(StorageError::NotFound) => 100.0,
            Err(e) => {
                warn!("SOH: load failed ({}), assuming 100%", e);
                100.0
            }
        };
        self.high_temp_s = match store.get_u64(KEY_HIGH_TEMP_S) {
            Ok(v) => v,
            Err(StorageError::NotFound) => 0,
            Err(e) => {
                warn!("SOH: high-temp counter load failed ({})", e);
                0
            }
        };
        self.last_update_ms = now_ms;
        self.last_save_ms = now_ms;
        info!("SOH: initialised at {:.1}%", self.soh);
    }

    /// Rate-limited periodic update. Returns `true` if the update ran.
    ///
    /// The fault penalty is applied on the rising edge of `fault` only; it
    /// re-arms once `fault` has been seen false.
    pub fn update(&mut self, temp_c: f32, fault: bool, now_ms: u64) -> bool {
        let elapsed = now_ms.saturating_sub(self.last_update_ms);
        if elapsed < UPDATE_INTERVAL_MS {
            return false;
        }

        if temp_c > self.high_temp_threshold_c {
            let exposure_ms = self.high_temp_rem_ms + elapsed;
            self.high_temp_s = self.high_temp_s.saturating_add(exposure_ms / 1_000);
            self.high_temp_rem_ms = exposure_ms % 1_000;
            let hours = elapsed as f32 / MS_PER_HOUR;
            self.soh -= self.high_temp_rate * hours * temp_factor(temp_c);
        }

        if fault && !self.fault_seen {
            self.degrade_by_fault();
            self.fault_seen = true;
        }
        if !fault {
            self.fault_seen = false;
        }

        self.soh = self.soh.clamp(self.floor, 100.0);
        self.last_update_ms = now_ms;
        true
    }

    pub fn degrade_by_fault(&mut self) {
        self.soh = (self.soh - self.per_fault).clamp(self.floor, 100.0);
        info!("SOH: fault degradation -> {:.1}%", self.soh);
    }

    /// One completed charge cycle at `depth_pct` depth of discharge.
    pub fn degrade_by_cycle(&mut self, depth_pct: f32) {
        let step = self.per_cycle * depth_factor(depth_pct);
        self.soh = (self.soh - step).clamp(self.floor, 100.0);
        info!("SOH: cycle degradation ({:.0}% DoD) -> {:.1}%", depth_pct, self.soh);
    }

    /// Apply thermal stress for an externally measured exposure.
    pub fn degrade_by_temperature(&mut self, temp_c: f32, duration_ms: u64) {
        let hours = duration_ms as f32 / MS_PER_HOUR;
        let step = self.high_temp_rate * hours * temp_factor(temp_c);
        self.soh = (self.soh - step).clamp(self.floor, 100.0);
    }

    /// Fresh pack: SOH 100 %, exposure counter zeroed, persisted immediately.
    pub fn reset(&mut self, store: &mut impl StoragePort, now_ms: u64) -> Result<()> {
        self.soh = 100.0;
        self.high_temp_s = 0;
        self.high_temp_rem_ms = 0;
        self.fault_seen = false;
        info!("SOH: reset to 100%");
        self.save(store, now_ms)
    }

    pub fn save(&mut self, store: &mut impl StoragePort, now_ms: u64) -> Result<()> {
        self.last_save_ms = now_ms;
        store.put_f32(KEY_SOH, self.soh)?;
        store.put_u64(KEY_HIGH_TEMP_S, self.high_temp_s)?;
        debug!("SOH: saved {:.2}% ({} s above threshold)", self.soh, self.high_temp_s);
        Ok(())
    }

    pub fn save_if_due(&mut self, store: &mut impl StoragePort, now_ms: u64) {
        if now_ms.saturating_sub(self.last_save_ms) < self.save_interval_ms {
            return;
        }
        if let Err(e) = self.save(store, now_ms) {
            warn!("SOH: periodic save failed ({})", e);
        }
    }

    pub fn soh(&self) -> f32 {
        self.soh
    }

    pub fn high_temp_seconds(&self) -> u64 {
        self.high_temp_s
    }

    pub fn remaining_capacity_ah(&self) -> f32 {
        self.rated_ah * self.soh / 100.0
    }

    pub fn needs_replacement(&self) -> bool {
        self.soh <= self.floor
    }

    pub fn floor(&self) -> f32 {
        self.floor
    }
}
