//! System configuration parameters
//!
//! All tunable thresholds for the battery pack supervisor.
//! Values can be overridden at runtime (operator command) and are persisted
//! as a postcard blob through [`ConfigPort`](crate::app::ports::ConfigPort).

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmsConfig {
    // --- Pack ---
    /// Number of series cells
    pub cell_count: u8,
    /// Nominal cell voltage (V)
    pub nominal_cell_v: f32,
    /// Rated pack capacity (Ah)
    pub rated_capacity_ah: f32,
    /// Sign of the current sensor: `true` when discharge reads positive
    pub discharge_positive: bool,

    // --- Voltage limits (per cell) ---
    pub cell_max_v: f32,
    pub cell_min_v: f32,
    /// Maximum allowed spread between highest and lowest cell (V)
    pub max_imbalance_v: f32,
    /// Start charging at or below this per-cell voltage
    pub charge_start_cell_v: f32,
    /// Stop charging at or above this per-cell voltage
    pub charge_stop_cell_v: f32,

    // --- Current limits ---
    pub max_charge_a: f32,
    pub max_discharge_a: f32,
    /// Below this magnitude the pack is considered idle (SOC correction)
    pub idle_current_a: f32,
    /// Charging current magnitude that locks out the motor relay
    pub charge_detect_a: f32,

    // --- Temperature limits (°C) ---
    pub max_cell_temp_c: f32,
    pub min_cell_temp_c: f32,
    /// Thermal runaway threshold
    pub max_pack_temp_c: f32,
    pub fan_on_temp_c: f32,
    pub fan_off_temp_c: f32,
    /// Recovery margin below/above the temperature trip points
    pub temp_recovery_margin_c: f32,
    /// Recovery margin inside the voltage band
    pub voltage_recovery_margin_v: f32,

    // --- Motion ---
    pub free_fall_g: f32,
    pub free_fall_samples: u8,
    pub impact_g: f32,
    pub shock_g: f32,
    pub impact_window_ms: u32,

    // --- Health ---
    pub soh_min_percent: f32,
    pub soh_degrade_per_fault: f32,
    pub soh_degrade_per_cycle: f32,
    /// SOH lost per hour spent above `high_temp_threshold_c`
    pub soh_degrade_high_temp: f32,
    pub high_temp_threshold_c: f32,
    pub rul_cycles_new: u32,
    pub rul_weight_voltage: f32,
    pub rul_weight_temp: f32,
    pub rul_weight_cycles: f32,

    // --- Geofence ---
    pub geofence_enabled: bool,
    pub home_lat: f64,
    pub home_lon: f64,
    pub geofence_radius_m: f32,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u32,
    /// Telemetry publish interval (milliseconds)
    pub telemetry_interval_ms: u32,
    /// Motor switch-on blanking window (milliseconds)
    pub inrush_blanking_ms: u32,
    /// Normal alert channel cooldown (milliseconds)
    pub alert_cooldown_ms: u32,
    pub geofence_alert_cooldown_ms: u32,
    pub impact_alert_cooldown_ms: u32,
    pub soc_save_interval_ms: u32,
    pub soh_save_interval_ms: u32,
}

impl Default for BmsConfig {
    fn default() -> Self {
        Self {
            // Pack: 3S, 50 Ah
            cell_count: 3,
            nominal_cell_v: 3.7,
            rated_capacity_ah: 50.0,
            discharge_positive: true,

            // Voltage
            cell_max_v: 4.25,
            cell_min_v: 3.0,
            max_imbalance_v: 0.2,
            charge_start_cell_v: 3.3,
            charge_stop_cell_v: 4.1,

            // Current
            max_charge_a: 30.0,
            max_discharge_a: 60.0,
            idle_current_a: 0.15,
            charge_detect_a: 0.3,

            // Temperature
            max_cell_temp_c: 60.0,
            min_cell_temp_c: 0.0,
            max_pack_temp_c: 65.0,
            fan_on_temp_c: 40.0,
            fan_off_temp_c: 35.0,
            temp_recovery_margin_c: 2.0,
            voltage_recovery_margin_v: 0.1,

            // Motion
            free_fall_g: 0.3,
            free_fall_samples: 3,
            impact_g: 2.5,
            shock_g: 4.0,
            impact_window_ms: 250,

            // Health
            soh_min_percent: 60.0,
            soh_degrade_per_fault: 0.2,
            soh_degrade_per_cycle: 0.05,
            soh_degrade_high_temp: 0.1,
            high_temp_threshold_c: 45.0,
            rul_cycles_new: 1000,
            rul_weight_voltage: 0.3,
            rul_weight_temp: 0.3,
            rul_weight_cycles: 0.4,

            // Geofence
            geofence_enabled: true,
            home_lat: 12.9716,
            home_lon: 77.5946,
            geofence_radius_m: 100.0,

            // Timing
            control_loop_interval_ms: 200,
            telemetry_interval_ms: 10_000,
            inrush_blanking_ms: 500,
            alert_cooldown_ms: 30_000,
            geofence_alert_cooldown_ms: 60_000,
            impact_alert_cooldown_ms: 10_000,
            soc_save_interval_ms: 120_000,
            soh_save_interval_ms: 300_000,
        }
    }
}

impl BmsConfig {
    pub fn max_pack_v(&self) -> f32 {
        self.cell_max_v * f32::from(self.cell_count)
    }

    pub fn min_pack_v(&self) -> f32 {
        self.cell_min_v * f32::from(self.cell_count)
    }

    pub fn charge_start_v(&self) -> f32 {
        self.charge_start_cell_v * f32::from(self.cell_count)
    }

    pub fn charge_stop_v(&self) -> f32 {
        self.charge_stop_cell_v * f32::from(self.cell_count)
    }

    pub fn nominal_pack_v(&self) -> f32 {
        self.nominal_cell_v * f32::from(self.cell_count)
    }

    /// Map a raw sensor reading onto the internal convention
    /// (positive = discharge, negative = charge).
    pub fn normalize_current(&self, raw_a: f32) -> f32 {
        if self.discharge_positive { raw_a } else { -raw_a }
    }

    /// Every float field, widened to `f64`.
    fn float_fields(&self) -> [f64; 32] {
        [
            f64::from(self.nominal_cell_v),
            f64::from(self.rated_capacity_ah),
            f64::from(self.cell_max_v),
            f64::from(self.cell_min_v),
            f64::from(self.max_imbalance_v),
            f64::from(self.charge_start_cell_v),
            f64::from(self.charge_stop_cell_v),
            f64::from(self.max_charge_a),
            f64::from(self.max_discharge_a),
            f64::from(self.idle_current_a),
            f64::from(self.charge_detect_a),
            f64::from(self.max_cell_temp_c),
            f64::from(self.min_cell_temp_c),
            f64::from(self.max_pack_temp_c),
            f64::from(self.fan_on_temp_c),
            f64::from(self.fan_off_temp_c),
            f64::from(self.temp_recovery_margin_c),
            f64::from(self.voltage_recovery_margin_v),
            f64::from(self.free_fall_g),
            f64::from(self.impact_g),
            f64::from(self.shock_g),
            f64::from(self.soh_min_percent),
            f64::from(self.soh_degrade_per_fault),
            f64::from(self.soh_degrade_per_cycle),
            f64::from(self.soh_degrade_high_temp),
            f64::from(self.high_temp_threshold_c),
            f64::from(self.rul_weight_voltage),
            f64::from(self.rul_weight_temp),
            f64::from(self.rul_weight_cycles),
            self.home_lat,
            self.home_lon,
            f64::from(self.geofence_radius_m),
        ]
    }

    /// Range-check every field. Invalid values are rejected, never clamped.
    /// Non-finite floats fail before any range check runs.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.float_fields().iter().all(|v| v.is_finite()) {
            return Err("thresholds must be finite numbers");
        }
        if !(1..=16).contains(&self.cell_count) {
            return Err("cell_count must be 1–16");
        }
        if !(1.0..=1000.0).contains(&self.rated_capacity_ah) {
            return Err("rated_capacity_ah must be 1–1000");
        }
        if self.cell_min_v >= self.cell_max_v {
            return Err("cell_min_v must be < cell_max_v");
        }
        if self.charge_start_cell_v <= self.cell_min_v
            || self.charge_stop_cell_v >= self.cell_max_v
            || self.charge_start_cell_v >= self.charge_stop_cell_v
        {
            return Err("charge window must sit strictly inside the cell voltage band");
        }
        if !(0.01..=1.0).contains(&self.max_imbalance_v) {
            return Err("max_imbalance_v must be 0.01–1.0");
        }
        if self.max_charge_a <= 0.0 || self.max_discharge_a <= 0.0 {
            return Err("current limits must be positive");
        }
        if self.idle_current_a < 0.0 || self.charge_detect_a < 0.0 {
            return Err("idle/charge-detect thresholds must be non-negative");
        }
        if self.min_cell_temp_c >= self.max_cell_temp_c {
            return Err("min_cell_temp_c must be < max_cell_temp_c");
        }
        if self.max_pack_temp_c <= self.max_cell_temp_c {
            return Err("max_pack_temp_c must exceed max_cell_temp_c");
        }
        if self.fan_off_temp_c >= self.fan_on_temp_c {
            return Err("fan_off_temp_c must be < fan_on_temp_c");
        }
        if self.free_fall_samples == 0 || self.free_fall_g <= 0.0 {
            return Err("free-fall detection needs a positive threshold and sample count");
        }
        if self.impact_g <= self.free_fall_g || self.shock_g <= self.impact_g {
            return Err("motion thresholds must satisfy free_fall < impact < shock");
        }
        if !(1.0..=100.0).contains(&self.soh_min_percent) {
            return Err("soh_min_percent must be 1–100");
        }
        if self.rul_cycles_new == 0 {
            return Err("rul_cycles_new must be non-zero");
        }
        let weights = self.rul_weight_voltage + self.rul_weight_temp + self.rul_weight_cycles;
        if (weights - 1.0).abs() > 0.01 {
            return Err("RUL weights must sum to 1.0");
        }
        if self.geofence_radius_m <= 0.0 {
            return Err("geofence_radius_m must be positive");
        }
        if !(50..=5000).contains(&self.control_loop_interval_ms) {
            return Err("control_loop_interval_ms must be 50–5000");
        }
        if self.telemetry_interval_ms < 10_000 {
            return Err("telemetry_interval_ms must be at least 10000");
        }
        Ok(())
    }
}
