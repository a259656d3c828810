//! Sensor frame: one cycle's worth of already-converted physical values.
//!
//! Acquisition (ADC, I²C, NMEA) happens outside the core; it hands over a
//! [`SensorFrame`] per control cycle. On its own failure it is expected to
//! resend the last-known values rather than leave fields undefined.

use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Maximum accelerometer samples carried per control cycle
/// (~100 Hz sampling against a 200 ms loop, with headroom).
pub const MAX_ACCEL_SAMPLES: usize = 32;

/// One 3-axis accelerometer reading in g.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Monotonic sample time (ms since boot).
    pub timestamp_ms: u64,
}

impl AccelSample {
    pub fn new(x: f32, y: f32, z: f32, timestamp_ms: u64) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A valid position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
}

/// Everything the supervisor consumes in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub pack_v: f32,
    pub cell_min_v: f32,
    pub cell_max_v: f32,
    pub cell_imbalance_v: f32,
    /// Signed pack current as reported by the sensor (A).
    pub current_a: f32,
    /// Sustained over-current, already duration-debounced upstream.
    pub overcurrent: bool,
    pub temp_max_c: f32,
    pub temp_min_c: f32,
    pub accel: Vec<AccelSample, MAX_ACCEL_SAMPLES>,
    pub gps: Option<GpsFix>,
}

impl SensorFrame {
    /// A quiescent frame at the given pack voltage with balanced cells,
    /// no current and room temperature.
    pub fn nominal(pack_v: f32, cell_count: u8) -> Self {
        let cell = pack_v / f32::from(cell_count.max(1));
        Self {
            pack_v,
            cell_min_v: cell,
            cell_max_v: cell,
            cell_imbalance_v: 0.0,
            current_a: 0.0,
            overcurrent: false,
            temp_max_c: 25.0,
            temp_min_c: 25.0,
            accel: Vec::new(),
            gps: None,
        }
    }
}
