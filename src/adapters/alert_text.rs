//! Human-readable rendering of [`Alert`]s.
//!
//! The domain only produces structured alerts; the message and SMS bodies
//! that operators see are built here, at the delivery boundary.

use core::fmt;

use crate::app::events::Alert;
use crate::frame::GpsFix;
use crate::relays::StopReason;

/// Display wrapper producing the long-form (messaging) text of an alert.
pub struct AlertText<'a>(pub &'a Alert);

fn write_location(f: &mut fmt::Formatter<'_>, fix: &GpsFix) -> fmt::Result {
    write!(f, "\nLat:{:.5} Lon:{:.5}", fix.lat, fix.lon)
}

impl fmt::Display for AlertText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Alert::FaultLatched { kind, severity } => {
                write!(f, "BMS FAULT DETECTED\n{} (severity {})", kind, severity)
            }
            Alert::FaultsRecovered => f.write_str("BMS: faults cleared, motor re-enabled"),
            Alert::ThermalTrip { temp_c } => {
                write!(f, "BMS: thermal trip at {:.1}C, charging stopped", temp_c)
            }
            Alert::ThermalClear { temp_c } => write!(f, "BMS: thermal clear at {:.1}C", temp_c),
            Alert::ChargingStopped { reason } => match reason {
                StopReason::Fault => f.write_str("BMS: charging stopped (fault)"),
                StopReason::ThermalTrip => f.write_str("BMS: charging stopped (over temperature)"),
            },
            Alert::ReadyToCharge { pack_v } => write!(f, "BMS: battery low ({:.2}V), ready to charge", pack_v),
            Alert::ChargeComplete { pack_v, cycle_count } => {
                write!(f, "BMS: charge complete at {:.2}V (cycle {})", pack_v, cycle_count)
            }
            Alert::Geofence { position, .. } => {
                f.write_str("BMS ALERT: Geo-fence violated!")?;
                write_location(f, position)
            }
            Alert::Impact {
                peak_g,
                shock_count,
                position,
                ..
            } => {
                write!(f, "BMS ALERT: Impact detected!\nMag:{:.2}g Shocks:{}", peak_g, shock_count)?;
                match position {
                    Some(fix) => write_location(f, fix),
                    None => Ok(()),
                }
            }
            Alert::Anomaly { score } => write!(f, "BMS: anomaly detected (score {})", score),
            Alert::ReplacementDue { soh, days_left } => {
                write!(f, "BMS: battery replacement due, SOH {:.1}%", soh)?;
                match days_left {
                    Some(days) => write!(f, " (~{} days left)", days),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Short fixed text for the SMS channel.
pub fn sms_text(alert: &Alert) -> &'static str {
    match alert {
        Alert::FaultLatched { .. } => "BMS FAULT DETECTED",
        Alert::FaultsRecovered => "BMS: FAULTS CLEARED",
        Alert::ThermalTrip { .. } => "BMS: THERMAL TRIP",
        Alert::ThermalClear { .. } => "BMS: THERMAL CLEAR",
        Alert::ChargingStopped { .. } => "BMS: CHARGING STOPPED",
        Alert::ReadyToCharge { .. } => "BMS: READY TO CHARGE",
        Alert::ChargeComplete { .. } => "BMS: CHARGE COMPLETE",
        Alert::Geofence { .. } => "BMS: GEOFENCE ALERT",
        Alert::Impact { .. } => "BMS: IMPACT DETECTED",
        Alert::Anomaly { .. } => "BMS: ANOMALY",
        Alert::ReplacementDue { .. } => "BMS: REPLACE BATTERY",
    }
}
