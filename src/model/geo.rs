use serde::{Deserialize, Serialize};

/// A latitude/longitude/altitude fix.
///
/// Great-circle distance is always haversine; the 111 km/degree constant
/// (see [`crate::geo::math::METERS_PER_DEGREE`]) is reserved for coarse
/// bounding-box work only, never for distance assertions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Signed meters. `None` when the source packet carried no altitude.
    pub altitude_m: Option<i16>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_m: None,
        }
    }

    pub fn with_altitude(latitude: f64, longitude: f64, altitude_m: i16) -> Self {
        Self {
            latitude,
            longitude,
            altitude_m: Some(altitude_m),
        }
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}
