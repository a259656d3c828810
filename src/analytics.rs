//! Edge analytics: short moving windows and a coarse anomaly score.

use heapless::HistoryBuffer;

use crate::config::BmsConfig;

const WINDOW: usize = 10;

const VOLTAGE_DEVIATION_V: f32 = 0.5;
const TEMP_DEVIATION_C: f32 = 5.0;
/// Fraction of the discharge limit counted as a current anomaly.
const CURRENT_FRACTION: f32 = 0.8;

const VOLTAGE_SCORE: u8 = 30;
const TEMP_SCORE: u8 = 30;
const CURRENT_SCORE: u8 = 40;

const ANOMALY_THRESHOLD: u8 = 60;
const TREND_THRESHOLD: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalyticsSnapshot {
    pub voltage_avg: f32,
    pub current_avg: f32,
    pub temp_avg: f32,
    pub anomaly_score: u8,
    pub anomaly: bool,
    pub trend_warning: bool,
}

pub struct EdgeAnalytics {
    voltage: HistoryBuffer<f32, WINDOW>,
    current: HistoryBuffer<f32, WINDOW>,
    temp: HistoryBuffer<f32, WINDOW>,
    current_limit_a: f32,
    snapshot: AnalyticsSnapshot,
}

fn mean(buf: &HistoryBuffer<f32, WINDOW>) -> f32 {
    let samples = buf.as_slice();
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}

impl EdgeAnalytics {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            voltage: HistoryBuffer::new(),
            current: HistoryBuffer::new(),
            temp: HistoryBuffer::new(),
            current_limit_a: config.max_discharge_a * CURRENT_FRACTION,
            snapshot: AnalyticsSnapshot::default(),
        }
    }

    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.current_limit_a = config.max_discharge_a * CURRENT_FRACTION;
    }

    /// Push one sample; the averages include it.
    pub fn update(&mut self, pack_v: f32, current_a: f32, temp_c: f32) -> AnalyticsSnapshot {
        self.voltage.write(pack_v);
        self.current.write(current_a);
        self.temp.write(temp_c);

        let voltage_avg = mean(&self.voltage);
        let current_avg = mean(&self.current);
        let temp_avg = mean(&self.temp);

        let mut score = 0u8;
        if (pack_v - voltage_avg).abs() > VOLTAGE_DEVIATION_V {
            score += VOLTAGE_SCORE;
        }
        if (temp_c - temp_avg).abs() > TEMP_DEVIATION_C {
            score += TEMP_SCORE;
        }
        if current_a.abs() > self.current_limit_a {
            score += CURRENT_SCORE;
        }

        self.snapshot = AnalyticsSnapshot {
            voltage_avg,
            current_avg,
            temp_avg,
            anomaly_score: score,
            anomaly: score >= ANOMALY_THRESHOLD,
            trend_warning: score >= TREND_THRESHOLD,
        };
        self.snapshot
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics() -> EdgeAnalytics {
        EdgeAnalytics::new(&BmsConfig::default())
    }

    #[test]
    fn steady_signal_scores_zero() {
        let mut a = analytics();
        let mut snap = AnalyticsSnapshot::default();
        for _ in 0..20 {
            snap = a.update(11.5, 5.0, 25.0);
        }
        assert_eq!(snap.anomaly_score, 0);
        assert!(!snap.anomaly);
        assert!((snap.voltage_avg - 11.5).abs() < 1e-4);
    }

    #[test]
    fn current_alone_is_a_trend_warning() {
        let mut a = analytics();
        // 0.8 × 60 A = 48 A
        let snap = a.update(11.5, 50.0, 25.0);
        assert_eq!(snap.anomaly_score, 40);
        assert!(snap.trend_warning);
        assert!(!snap.anomaly);
    }

    #[test]
    fn voltage_and_temperature_jump_is_an_anomaly() {
        let mut a = analytics();
        for _ in 0..9 {
            a.update(11.5, 5.0, 25.0);
        }
        // avg V = 11.4, avg T = 28.5 after the jump → deviations 0.9 V, 31.5 °C
        let snap = a.update(10.5, 5.0, 60.0);
        assert_eq!(snap.anomaly_score, 60);
        assert!(snap.anomaly);
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut a = analytics();
        for _ in 0..10 {
            a.update(9.0, 0.0, 25.0);
        }
        let mut snap = AnalyticsSnapshot::default();
        for _ in 0..10 {
            snap = a.update(12.0, 0.0, 25.0);
        }
        assert!((snap.voltage_avg - 12.0).abs() < 1e-4);
        assert_eq!(snap.anomaly_score, 0);
    }
}
