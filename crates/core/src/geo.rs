use serde::{Deserialize, Serialize};
use waypoint_common::{Result, WaypointError};

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default distance within which a coin can be collected.
pub const DEFAULT_COLLECTION_RADIUS_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self, other)
    }

    pub fn is_within(&self, other: &GeoPoint, radius_m: f64) -> bool {
        self.distance_to(other) <= radius_m
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(WaypointError::Validation(
            "latitude must be between -90 and 90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(WaypointError::Validation(
            "longitude must be between -180 and 180".to_string(),
        ));
    }
    Ok(())
}

/// Great-circle distance between two points in metres.
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}
