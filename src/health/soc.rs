//! State-of-charge estimator.
//!
//! Coulomb counting while current flows; while idle, a correction is marked
//! due and [`SocEstimator::correct_from_voltage`] blends 10 % of the
//! open-circuit-voltage estimate into the count.

use log::{debug, info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::BmsConfig;
use crate::error::{Error, Result};
use crate::persist::{KEY_SOC, KvStore};

/// Coulombic efficiency while charging (fraction that actually enters).
pub const CHARGE_EFF: f32 = 0.98;
/// Coulombic efficiency while discharging.
pub const DISCHARGE_EFF: f32 = 1.0;
/// Weight kept on the Coulomb count during a voltage correction.
const COUNT_WEIGHT: f32 = 0.9;

const MS_PER_HOUR: f32 = 3_600_000.0;

/// Per-cell open-circuit voltage knots (V) and their SOC (%).
const OCV_TABLE: [(f32, f32); 10] = [
    (3.00, 0.0),
    (3.20, 5.0),
    (3.40, 15.0),
    (3.60, 30.0),
    (3.70, 50.0),
    (3.80, 65.0),
    (3.90, 80.0),
    (4.00, 90.0),
    (4.10, 97.0),
    (4.15, 100.0),
];

/// Piecewise-linear SOC estimate for one resting cell.
pub fn ocv_soc(cell_v: f32) -> f32 {
    let (first_v, first_soc) = OCV_TABLE[0];
    let (last_v, last_soc) = OCV_TABLE[OCV_TABLE.len() - 1];
    if cell_v >= last_v {
        return last_soc;
    }
    if cell_v <= first_v {
        return first_soc;
    }
    for pair in OCV_TABLE.windows(2) {
        let (v0, s0) = pair[0];
        let (v1, s1) = pair[1];
        if cell_v >= v0 && cell_v < v1 {
            let t = (cell_v - v0) / (v1 - v0);
            return s0 + t * (s1 - s0);
        }
    }
    50.0
}

pub struct SocEstimator {
    rated_ah: f32,
    cell_count: u8,
    idle_current_a: f32,
    soc: f32,
    remaining_ah: f32,
    correction_due: bool,
    save_interval_ms: u64,
    last_save_ms: u64,
}

impl SocEstimator {
    /// Start full; call [`init`](Self::init) once the first frame is in.
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            rated_ah: config.rated_capacity_ah,
            cell_count: config.cell_count,
            idle_current_a: config.idle_current_a,
            soc: 100.0,
            remaining_ah: config.rated_capacity_ah,
            correction_due: false,
            save_interval_ms: u64::from(config.soc_save_interval_ms),
            last_save_ms: 0,
        }
    }

    /// Restore the persisted SOC if present and in range, otherwise estimate
    /// it from the resting pack voltage.
    pub fn init(&mut self, store: &impl StoragePort, pack_v: f32) {
        match store.get_f32(KEY_SOC) {
            Ok(saved) if (0.0..=100.0).contains(&saved) => {
                self.set_soc(saved);
                info!("SOC: restored {:.1}%", saved);
            }
            Ok(saved) => {
                warn!("SOC: stored value {:.1} out of range, estimating from OCV", saved);
                self.set_soc(self.ocv_estimate(pack_v));
            }
            Err(StorageError::NotFound) => {
                self.set_soc(self.ocv_estimate(pack_v));
                info!("SOC: estimated {:.1}% from {:.2}V", self.soc, pack_v);
            }
            Err(e) => {
                warn!("SOC: load failed ({}), estimating from OCV", e);
                self.set_soc(self.ocv_estimate(pack_v));
            }
        }
    }

    /// Integrate `current_a` (positive = discharge) over `dt_ms`.
    pub fn update(&mut self, current_a: f32, dt_ms: u64) {
        if current_a.abs() < self.idle_current_a {
            self.correction_due = true;
            return;
        }
        let dt_h = dt_ms as f32 / MS_PER_HOUR;
        let delta_ah = if current_a > 0.0 {
            -current_a * DISCHARGE_EFF * dt_h
        } else {
            -current_a * CHARGE_EFF * dt_h
        };
        self.remaining_ah = (self.remaining_ah + delta_ah).clamp(0.0, self.rated_ah);
        self.soc = self.remaining_ah / self.rated_ah * 100.0;
    }

    /// Blend the OCV estimate in, but only if an idle period made it due.
    /// Returns `true` when a correction was applied.
    pub fn correct_from_voltage(&mut self, pack_v: f32) -> bool {
        if !self.correction_due {
            return false;
        }
        let target = self.ocv_estimate(pack_v);
        let blended = (self.soc * COUNT_WEIGHT + target * (1.0 - COUNT_WEIGHT)).clamp(0.0, 100.0);
        self.set_soc(blended);
        self.correction_due = false;
        true
    }

    /// Operator override; persisted immediately.
    pub fn reset(&mut self, percent: f32, store: &mut impl StoragePort, now_ms: u64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(Error::Config("SOC reset must be 0–100 %"));
        }
        self.set_soc(percent);
        info!("SOC: reset to {:.1}%", percent);
        self.save(store, now_ms)
    }

    pub fn save(&mut self, store: &mut impl StoragePort, now_ms: u64) -> Result<()> {
        self.last_save_ms = now_ms;
        store.put_f32(KEY_SOC, self.soc)?;
        debug!("SOC: saved {:.1}%", self.soc);
        Ok(())
    }

    /// Periodic checkpoint. Failures are logged and the in-memory value kept.
    pub fn save_if_due(&mut self, store: &mut impl StoragePort, now_ms: u64) {
        if now_ms.saturating_sub(self.last_save_ms) < self.save_interval_ms {
            return;
        }
        if let Err(e) = self.save(store, now_ms) {
            warn!("SOC: periodic save failed ({})", e);
        }
    }

    pub fn soc(&self) -> f32 {
        self.soc
    }

    pub fn remaining_ah(&self) -> f32 {
        self.remaining_ah
    }

    pub fn correction_due(&self) -> bool {
        self.correction_due
    }

    fn ocv_estimate(&self, pack_v: f32) -> f32 {
        ocv_soc(pack_v / f32::from(self.cell_count.max(1)))
    }

    fn set_soc(&mut self, percent: f32) {
        self.soc = percent;
        self.remaining_ah = self.rated_ah * percent / 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    fn estimator() -> SocEstimator {
        SocEstimator::new(&BmsConfig::default())
    }

    #[test]
    fn ocv_table_endpoints_and_interpolation() {
        assert_eq!(ocv_soc(2.9), 0.0);
        assert_eq!(ocv_soc(3.0), 0.0);
        assert_eq!(ocv_soc(4.15), 100.0);
        assert_eq!(ocv_soc(4.3), 100.0);
        assert!((ocv_soc(3.7) - 50.0).abs() < 1e-3);
        assert!((ocv_soc(3.65) - 40.0).abs() < 1e-2);
    }

    #[test]
    fn ocv_is_monotonic() {
        let mut prev = -1.0;
        let mut v = 2.9;
        while v < 4.3 {
            let s = ocv_soc(v);
            assert!(s >= prev, "OCV SOC dropped at {v}");
            prev = s;
            v += 0.01;
        }
    }

    #[test]
    fn constant_discharge_for_one_hour() {
        let mut soc = estimator();
        let before = soc.remaining_ah();
        for _ in 0..3_600 {
            soc.update(10.0, 1_000);
        }
        let used = before - soc.remaining_ah();
        assert!((used - 10.0 * DISCHARGE_EFF).abs() < 0.01, "used {used} Ah");
    }

    #[test]
    fn discharge_clamps_at_zero() {
        let mut soc = estimator();
        soc.update(100.0, 3_600_000);
        assert_eq!(soc.remaining_ah(), 0.0);
        assert_eq!(soc.soc(), 0.0);
    }

    #[test]
    fn charge_applies_efficiency_and_clamps_at_capacity() {
        let mut soc = estimator();
        soc.set_soc(50.0);
        soc.update(-10.0, 3_600_000);
        assert!((soc.remaining_ah() - (25.0 + 9.8)).abs() < 1e-3);
        soc.update(-100.0, 3_600_000);
        assert_eq!(soc.remaining_ah(), 50.0);
        assert_eq!(soc.soc(), 100.0);
    }

    #[test]
    fn idle_marks_correction_and_does_not_integrate() {
        let mut soc = estimator();
        soc.update(0.1, 1_000);
        assert!(soc.correction_due());
        assert_eq!(soc.soc(), 100.0);
    }

    #[test]
    fn idle_correction_moves_ten_percent_once() {
        let mut soc = estimator();
        soc.set_soc(80.0);
        for _ in 0..5 {
            soc.update(0.0, 200);
        }
        // 11.1 V → 3.7 V/cell → 50 %.
        assert!(soc.correct_from_voltage(11.1));
        assert!((soc.soc() - 77.0).abs() < 1e-3);
        // Further idle calls do not move SOC by themselves.
        soc.update(0.0, 200);
        soc.update(0.0, 200);
        assert!((soc.soc() - 77.0).abs() < 1e-3);
        // Without a fresh due flag nothing happens.
        let mut fresh = estimator();
        fresh.set_soc(80.0);
        assert!(!fresh.correct_from_voltage(11.1));
        assert_eq!(fresh.soc(), 80.0);
    }

    #[test]
    fn init_prefers_valid_persisted_value() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.put_f32(KEY_SOC, 42.0).unwrap();
        let mut soc = estimator();
        soc.init(&nvs, 12.45);
        assert_eq!(soc.soc(), 42.0);
        assert_eq!(soc.remaining_ah(), 21.0);
    }

    #[test]
    fn init_falls_back_to_ocv() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut soc = estimator();
        soc.init(&nvs, 11.1);
        assert!((soc.soc() - 50.0).abs() < 1e-3);

        nvs.put_f32(KEY_SOC, 140.0).unwrap();
        let mut soc = estimator();
        soc.init(&nvs, 9.0);
        assert_eq!(soc.soc(), 0.0);
    }

    #[test]
    fn reset_persists_and_rejects_out_of_range() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut soc = estimator();
        soc.reset(65.0, &mut nvs, 10).unwrap();
        assert_eq!(nvs.get_f32(KEY_SOC).unwrap(), 65.0);
        assert!(soc.reset(120.0, &mut nvs, 20).is_err());
        assert_eq!(soc.soc(), 65.0);
    }

    #[test]
    fn periodic_save_respects_interval() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut soc = estimator();
        soc.save_if_due(&mut nvs, 60_000);
        assert!(nvs.get_f32(KEY_SOC).is_err());
        soc.save_if_due(&mut nvs, 120_000);
        assert_eq!(nvs.get_f32(KEY_SOC).unwrap(), 100.0);
    }
}
