//! Alert dispatch with cooldown gating.
//!
//! Two channels:
//!
//! - **forced**: one-shot state transitions (fault latch, relay state
//!   changes). Never gated, always paired with a best-effort SMS.
//! - **normal**: repeating conditions. Gated by a shared 30 s window, with
//!   separate windows for geofence and impact alerts. A window only restarts
//!   after a successful send; failures are dropped, never retried.

use log::{debug, warn};

use crate::config::BmsConfig;

use super::events::{Alert, AlertKind};
use super::ports::AlertPort;

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// Suppressed by the cooldown window.
    CoolingDown,
    /// The primary channel rejected the alert.
    Failed,
}

impl Dispatch {
    pub fn sent(self) -> bool {
        self == Self::Sent
    }
}

/// Per-channel cooldown bookkeeping.
#[derive(Debug, Clone)]
pub struct AlertGate {
    general_ms: u64,
    geofence_ms: u64,
    impact_ms: u64,
    last_general: Option<u64>,
    last_geofence: Option<u64>,
    last_impact: Option<u64>,
}

impl AlertGate {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            general_ms: u64::from(config.alert_cooldown_ms),
            geofence_ms: u64::from(config.geofence_alert_cooldown_ms),
            impact_ms: u64::from(config.impact_alert_cooldown_ms),
            last_general: None,
            last_geofence: None,
            last_impact: None,
        }
    }

    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.general_ms = u64::from(config.alert_cooldown_ms);
        self.geofence_ms = u64::from(config.geofence_alert_cooldown_ms);
        self.impact_ms = u64::from(config.impact_alert_cooldown_ms);
    }

    fn slot(&mut self, kind: AlertKind) -> (&mut Option<u64>, u64) {
        match kind {
            AlertKind::Geofence => (&mut self.last_geofence, self.geofence_ms),
            AlertKind::Impact => (&mut self.last_impact, self.impact_ms),
            _ => (&mut self.last_general, self.general_ms),
        }
    }

    pub fn is_open(&mut self, kind: AlertKind, now_ms: u64) -> bool {
        let (last, window) = self.slot(kind);
        last.is_none_or(|t| now_ms.saturating_sub(t) >= window)
    }

    pub fn mark_sent(&mut self, kind: AlertKind, now_ms: u64) {
        let (last, _) = self.slot(kind);
        *last = Some(now_ms);
    }
}

/// Routes alerts to an [`AlertPort`] through the gate.
pub struct AlertDispatcher {
    gate: AlertGate,
}

impl AlertDispatcher {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            gate: AlertGate::new(config),
        }
    }

    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.gate.reconfigure(config);
    }

    /// Ungated send plus SMS. The SMS is best-effort and does not affect the
    /// result.
    pub fn forced(&mut self, alert: &Alert, port: &mut impl AlertPort) -> Dispatch {
        let result = match port.send(alert) {
            Ok(()) => Dispatch::Sent,
            Err(e) => {
                warn!("ALERT: forced {:?} not sent ({})", alert.kind(), e);
                Dispatch::Failed
            }
        };
        if let Err(e) = port.send_sms(alert) {
            warn!("ALERT: SMS not sent ({})", e);
        }
        result
    }

    /// Gated send. Geofence and impact alerts also go out by SMS.
    pub fn normal(&mut self, alert: &Alert, now_ms: u64, port: &mut impl AlertPort) -> Dispatch {
        let kind = alert.kind();
        if !self.gate.is_open(kind, now_ms) {
            debug!("ALERT: {:?} suppressed by cooldown", kind);
            return Dispatch::CoolingDown;
        }
        match port.send(alert) {
            Ok(()) => {
                self.gate.mark_sent(kind, now_ms);
                if matches!(kind, AlertKind::Geofence | AlertKind::Impact) {
                    if let Err(e) = port.send_sms(alert) {
                        warn!("ALERT: SMS not sent ({})", e);
                    }
                }
                Dispatch::Sent
            }
            Err(e) => {
                warn!("ALERT: {:?} dropped ({})", kind, e);
                Dispatch::Failed
            }
        }
    }
}
