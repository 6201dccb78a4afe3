//! Minimal geohash implementation: just enough to key the subscription
//! index (§4.7) by cell prefix. No geohash crate exists anywhere near this
//! corpus's dependency tree, so this is hand-rolled rather than faked.

use crate::model::geo::GeoPoint;

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Default subscription-index cell precision (~5 km cells), per §9:
/// "A single precision is used across the system."
pub const DEFAULT_PRECISION: usize = 5;

/// Encode a point to a geohash string of the given character length.
pub fn encode(point: &GeoPoint, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even_bit = true;
    let mut bit = 0u8;
    let mut ch = 0u8;
    let mut out = String::with_capacity(precision);

    while out.len() < precision {
        if even_bit {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if point.longitude >= mid {
                ch |= 1 << (4 - bit);
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if point.latitude >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even_bit = !even_bit;
        if bit < 4 {
            bit += 1;
        } else {
            out.push(BASE32[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }
    out
}

/// Approximate cell width/height in meters for a given geohash precision,
/// averaged across the two axes (cells alternate being wider in lon/lat by
/// bit parity; this is a coarse estimate good enough for covering radius).
fn cell_size_m(precision: usize) -> (f64, f64) {
    // Lookup table of (lon_deg, lat_deg) cell size by precision, standard
    // geohash bit layout (odd total bits favor longitude).
    let (lon_bits, lat_bits) = {
        let total_bits = precision * 5;
        let lon_bits = total_bits.div_ceil(2);
        let lat_bits = total_bits / 2;
        (lon_bits, lat_bits)
    };
    let lon_deg = 360.0 / 2f64.powi(lon_bits as i32);
    let lat_deg = 180.0 / 2f64.powi(lat_bits as i32);
    (lon_deg * crate::geo::math::METERS_PER_DEGREE, lat_deg * crate::geo::math::METERS_PER_DEGREE)
}

/// The optimal precision for a subscription radius: the coarsest precision
/// whose cell size is still comfortably smaller than the radius, clamped to
/// the system-wide [`DEFAULT_PRECISION`] per §9 ("implementers SHOULD NOT
/// mix precisions"). Kept as a pure helper in case that policy changes.
pub fn optimal_precision_for_radius(_radius_km: f64) -> usize {
    DEFAULT_PRECISION
}

/// Compute the set of geohash prefixes covering a (center, radius) disc.
/// Walks the bounding box in cell-sized steps and collects every distinct
/// prefix touched; callers must still re-check precise radius on lookup
/// (§4.7 — "each client's precise radius is re-checked before delivery").
pub fn covering(center: &GeoPoint, radius_km: f64, precision: usize) -> Vec<String> {
    let (lon_step_m, lat_step_m) = cell_size_m(precision);
    let lat_step_deg = (lat_step_m / crate::geo::math::METERS_PER_DEGREE).max(1e-6);
    let lon_step_deg = (lon_step_m
        / (crate::geo::math::METERS_PER_DEGREE * center.latitude.to_radians().cos().abs().max(0.01)))
    .max(1e-6);

    let radius_m = radius_km * 1000.0;
    let (lat_extent_deg, lon_extent_deg) = crate::geo::math::bounding_box_deg(center, radius_km);

    let mut cells = std::collections::HashSet::new();
    let mut lat = center.latitude - lat_extent_deg;
    while lat <= center.latitude + lat_extent_deg + lat_step_deg {
        let mut lon = center.longitude - lon_extent_deg;
        while lon <= center.longitude + lon_extent_deg + lon_step_deg {
            let probe = GeoPoint::new(
                lat.clamp(-90.0, 90.0),
                ((lon + 540.0) % 360.0) - 180.0,
            );
            if crate::geo::math::haversine_distance_m(center, &probe) <= radius_m + lon_step_m.max(lat_step_m) {
                cells.insert(encode(&probe, precision));
            }
            lon += lon_step_deg;
        }
        lat += lat_step_deg;
    }
    cells.insert(encode(center, precision));
    cells.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_point() {
        // Rough central-Europe point, should be stable within the 'u' block.
        let p = GeoPoint::new(46.5, 14.2);
        let hash = encode(&p, 5);
        assert_eq!(hash.len(), 5);
    }

    #[test]
    fn same_point_same_hash() {
        let p = GeoPoint::new(46.5, 14.2);
        assert_eq!(encode(&p, 5), encode(&p, 5));
    }

    #[test]
    fn covering_includes_center_cell() {
        let p = GeoPoint::new(46.5, 14.2);
        let cells = covering(&p, 10.0, 5);
        assert!(cells.contains(&encode(&p, 5)));
    }

    #[test]
    fn larger_radius_covers_more_cells() {
        let p = GeoPoint::new(46.5, 14.2);
        let small = covering(&p, 5.0, 5);
        let large = covering(&p, 100.0, 5);
        assert!(large.len() >= small.len());
    }
}
