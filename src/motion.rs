//! Motion event detector.
//!
//! Classifies a stream of 3-axis accelerometer samples into free-fall,
//! impact and shock events:
//!
//! ```text
//!            |a| < FREE_FALL for N samples
//!   Armed ─────────────────────────────────▶ InFreeFall
//!     ▲                                         │
//!     │  |a| > IMPACT within window  ──▶ Impact │
//!     │  window expired              ──▶ (none) │
//!     │  |a| > SHOCK (any state)     ──▶ Shock  │
//!     └─────────────────────────────────────────┘
//! ```
//!
//! Event flags are single-sample pulses: they are reset at the start of
//! every [`MotionDetector::process`] call.

use log::{info, warn};

use crate::config::BmsConfig;
use crate::frame::AccelSample;

/// Detection thresholds, copied out of [`BmsConfig`].
#[derive(Debug, Clone, Copy)]
pub struct MotionThresholds {
    pub free_fall_g: f32,
    pub free_fall_samples: u8,
    pub impact_g: f32,
    pub shock_g: f32,
    pub impact_window_ms: u64,
}

impl From<&BmsConfig> for MotionThresholds {
    fn from(cfg: &BmsConfig) -> Self {
        Self {
            free_fall_g: cfg.free_fall_g,
            free_fall_samples: cfg.free_fall_samples,
            impact_g: cfg.impact_g,
            shock_g: cfg.shock_g,
            impact_window_ms: u64::from(cfg.impact_window_ms),
        }
    }
}

/// Persistent detector state (memory only, reset on reboot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    pub in_free_fall: bool,
    pub free_fall_start_ms: u64,
    pub free_fall_sample_count: u8,
    pub impact_count: u32,
    pub shock_count: u32,
}

/// One-shot outputs of a single sample evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionEvents {
    pub free_fall: bool,
    pub impact: bool,
    pub shock: bool,
    pub magnitude: f32,
}

/// Aggregate of all samples processed in one control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSummary {
    pub free_fall: bool,
    pub impact: bool,
    pub shock: bool,
    /// Largest magnitude among the impact/shock samples (0 if none).
    pub peak_g: f32,
}

pub struct MotionDetector {
    thresholds: MotionThresholds,
    state: MotionState,
}

impl MotionDetector {
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self {
            thresholds,
            state: MotionState::default(),
        }
    }

    pub fn set_thresholds(&mut self, thresholds: MotionThresholds) {
        self.thresholds = thresholds;
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    /// Evaluate one sample.
    pub fn process(&mut self, sample: &AccelSample) -> MotionEvents {
        let now = sample.timestamp_ms;
        let magnitude = sample.magnitude();
        let mut events = MotionEvents {
            magnitude,
            ..MotionEvents::default()
        };
        let t = self.thresholds;

        // ── Landing window expired ────────────────────────────
        if self.state.in_free_fall
            && now.saturating_sub(self.state.free_fall_start_ms) > t.impact_window_ms
        {
            info!("MOTION: free fall expired without impact");
            self.reset_fall();
        }

        // ── Shock (independent of fall state) ─────────────────
        if magnitude > t.shock_g {
            events.shock = true;
            self.state.shock_count = self.state.shock_count.saturating_add(1);
            warn!("MOTION: shock {:.2}g (total {})", magnitude, self.state.shock_count);
            self.reset_fall();
            return events;
        }

        // ── Impact (only while falling) ───────────────────────
        if self.state.in_free_fall
            && magnitude > t.impact_g
            && now.saturating_sub(self.state.free_fall_start_ms) <= t.impact_window_ms
        {
            events.impact = true;
            self.state.impact_count = self.state.impact_count.saturating_add(1);
            warn!("MOTION: impact {:.2}g (total {})", magnitude, self.state.impact_count);
            self.reset_fall();
            return events;
        }

        // ── Free-fall debounce ────────────────────────────────
        if magnitude < t.free_fall_g {
            if self.state.free_fall_sample_count < t.free_fall_samples {
                self.state.free_fall_sample_count += 1;
            }
            if self.state.free_fall_sample_count >= t.free_fall_samples && !self.state.in_free_fall
            {
                self.state.in_free_fall = true;
                self.state.free_fall_start_ms = now;
                events.free_fall = true;
                info!("MOTION: free fall detected ({:.2}g)", magnitude);
            }
        } else {
            self.state.free_fall_sample_count = 0;
        }

        events
    }

    /// Evaluate every sample of a control cycle in order.
    pub fn process_batch<'a>(
        &mut self,
        samples: impl IntoIterator<Item = &'a AccelSample>,
    ) -> MotionSummary {
        let mut summary = MotionSummary::default();
        for sample in samples {
            let ev = self.process(sample);
            summary.free_fall |= ev.free_fall;
            if ev.impact || ev.shock {
                summary.impact |= ev.impact;
                summary.shock |= ev.shock;
                summary.peak_g = summary.peak_g.max(ev.magnitude);
            }
        }
        summary
    }

    fn reset_fall(&mut self) {
        self.state.in_free_fall = false;
        self.state.free_fall_sample_count = 0;
    }
}
