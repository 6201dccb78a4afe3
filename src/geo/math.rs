//! Pure geo-math helpers shared by the validator, boundary tracker, track
//! filter engine and subscription index. No external geo crate: plain f64
//! haversine, the same shape the rest of this codebase's distance math has
//! always used.

use crate::model::geo::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Coarse degrees-to-meters conversion for bounding-box work only.
/// Never use this for anything §8 asserts a distance on.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Coarse bounding box (lat/lon deltas) for a center point and radius in km.
/// Longitude delta widens at low latitudes, per the standard cosine correction.
pub fn bounding_box_deg(center: &GeoPoint, radius_km: f64) -> (f64, f64) {
    let lat_delta = (radius_km * 1000.0) / METERS_PER_DEGREE;
    let lon_delta = lat_delta / center.latitude.to_radians().cos().max(0.01);
    (lat_delta, lon_delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // Roughly 2 km apart along a meridian (~0.018 deg lat).
        let a = GeoPoint::new(46.0, 8.0);
        let b = GeoPoint::new(46.018, 8.0);
        let d = haversine_distance_m(&a, &b);
        assert!((d - 2000.0).abs() < 50.0, "distance was {d}");
    }

    #[test]
    fn zero_distance_for_identical_points() {
        let a = GeoPoint::new(46.5, 14.2);
        assert_eq!(haversine_distance_m(&a, &a), 0.0);
    }

}
