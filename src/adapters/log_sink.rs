//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC on the device). Fault latches go out at
//! `error!`, everything else at `info!`.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | V={:.2} I={:.2}A T={:.1}\u{00b0}C | SOC={:.1}% SOH={:.1}% \
                     RUL={}cyc | chg={} mot={} fan={} | fault={} sev={}",
                    t.pack_v,
                    t.current_a,
                    t.temp_max_c,
                    t.soc,
                    t.soh,
                    t.rul_cycles,
                    t.charging,
                    t.motor,
                    t.fan,
                    t.fault,
                    t.fault_severity,
                );
            }
            AppEvent::Started { soc, soh } => {
                info!("START | soc={:.1}% soh={:.1}%", soc, soh);
            }
            AppEvent::FaultLatched { kind, severity } => {
                error!("FAULT | latched {} (severity {})", kind, severity);
            }
            AppEvent::FaultRaised(kind) => info!("FAULT | set {}", kind),
            AppEvent::FaultCleared(kind) => info!("FAULT | cleared {}", kind),
            AppEvent::FaultsRecovered => info!("FAULT | all recovered"),
            AppEvent::FaultsClearedManually => info!("FAULT | cleared by operator"),
            AppEvent::RelayChanged { relay, on } => {
                info!("RELAY | {:?} -> {}", relay, if *on { "ON" } else { "OFF" });
            }
            AppEvent::ChargeCycleCompleted { cycle_count } => {
                info!("CYCLE | charge cycle #{} complete", cycle_count);
            }
            AppEvent::FreeFall => info!("MOTION | free fall"),
            AppEvent::Impact { peak_g } => info!("MOTION | impact {:.2}g", peak_g),
            AppEvent::Shock { peak_g } => info!("MOTION | shock {:.2}g", peak_g),
            AppEvent::GeofenceViolation { distance_m } => {
                warn!("GEO | outside fence ({:.0} m from home)", distance_m);
            }
            AppEvent::SocLow { soc } => warn!("SOC | low {:.1}%", soc),
            AppEvent::SocCritical { soc } => warn!("SOC | critical {:.1}%", soc),
            AppEvent::SohDegraded { soh } => warn!("SOH | replacement due at {:.1}%", soh),
            AppEvent::AlertDropped(kind) => warn!("ALERT | {:?} dropped", kind),
        }
    }
}
