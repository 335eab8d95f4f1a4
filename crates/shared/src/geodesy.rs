//! Geodesic helpers used by geofence containment and movement gating.

use geo::{point, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn as_point(&self) -> Point<f64> {
        point!(x: self.longitude, y: self.latitude)
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        self.as_point().haversine_distance(&other.as_point())
    }

    /// Whether this coordinate lies inside the circle of `radius_meters` around `center`.
    /// The boundary counts as inside.
    pub fn is_within(&self, center: &Coordinates, radius_meters: f64) -> bool {
        self.distance_to(center) <= radius_meters
    }
}
