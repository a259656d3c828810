//! Geofence: great-circle distance of the latest GPS fix from a home point.

use crate::config::BmsConfig;
use crate::frame::GpsFix;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in metres.
pub fn distance_m(a: GpsFix, b: GpsFix) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceStatus {
    pub distance_m: f32,
    pub violated: bool,
}

pub struct GeofenceMonitor {
    home: GpsFix,
    radius_m: f32,
    enabled: bool,
    last: Option<GeofenceStatus>,
}

impl GeofenceMonitor {
    pub fn new(config: &BmsConfig) -> Self {
        Self {
            home: GpsFix {
                lat: config.home_lat,
                lon: config.home_lon,
            },
            radius_m: config.geofence_radius_m,
            enabled: config.geofence_enabled,
            last: None,
        }
    }

    pub fn reconfigure(&mut self, config: &BmsConfig) {
        self.home = GpsFix {
            lat: config.home_lat,
            lon: config.home_lon,
        };
        self.radius_m = config.geofence_radius_m;
        self.enabled = config.geofence_enabled;
    }

    pub fn set_home(&mut self, home: GpsFix) {
        self.home = home;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.last = None;
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn home(&self) -> GpsFix {
        self.home
    }

    /// Check one fix. Returns `None` when disabled or without a fix.
    pub fn check(&mut self, fix: Option<GpsFix>) -> Option<GeofenceStatus> {
        if !self.enabled {
            return None;
        }
        let fix = fix?;
        let distance = distance_m(self.home, fix) as f32;
        let status = GeofenceStatus {
            distance_m: distance,
            violated: distance > self.radius_m,
        };
        self.last = Some(status);
        Some(status)
    }

    pub fn last(&self) -> Option<GeofenceStatus> {
        self.last
    }
}
