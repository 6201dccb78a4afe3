//! `PreCleanupFilter` (§4.6): drops gross outliers relative to the track's
//! own spatial center before segmentation, using a robust (median-based)
//! notion of "normal" rather than mean/stddev so a handful of wild points
//! doesn't skew the threshold that's supposed to catch them.

use crate::geo::math::haversine_distance_m;
use crate::model::entities::TrackPoint;
use crate::model::geo::GeoPoint;

use super::types::FilterStatistics;

const NEAREST_NEIGHBOR_WINDOW: usize = 5;
const BOUNDARY_NEIGHBOR_DISTANCE_M: f64 = 50_000.0;
const INTERIOR_NEIGHBOR_DISTANCE_M: f64 = 10_000.0;
const INTERIOR_MIN_NEIGHBORS: usize = 2;
const CLUSTER_RADIUS_MIN_M: f64 = 20_000.0;
const CLUSTER_RADIUS_MAX_M: f64 = 200_000.0;

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.is_empty() {
        0.0
    } else if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn percentile(mut values: Vec<f64>, p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = (p * (values.len() - 1) as f64).round() as usize;
    values[rank.min(values.len() - 1)]
}

pub fn apply(points: &mut [TrackPoint]) -> FilterStatistics {
    let mut stats = FilterStatistics::default();

    let live_indices: Vec<usize> = (0..points.len()).filter(|&i| !points[i].filtered).collect();
    if live_indices.len() < 3 {
        return stats;
    }

    let median_point = GeoPoint::new(
        median(live_indices.iter().map(|&i| points[i].position.latitude).collect()),
        median(live_indices.iter().map(|&i| points[i].position.longitude).collect()),
    );

    let distances: Vec<f64> = live_indices
        .iter()
        .map(|&i| haversine_distance_m(&median_point, &points[i].position))
        .collect();
    let cluster_radius_m = percentile(distances, 0.75).clamp(CLUSTER_RADIUS_MIN_M, CLUSTER_RADIUS_MAX_M);

    for (pos, &i) in live_indices.iter().enumerate() {
        let distance_from_median = haversine_distance_m(&median_point, &points[i].position);
        let is_boundary = pos == 0 || pos == live_indices.len() - 1;

        let window_start = pos.saturating_sub(NEAREST_NEIGHBOR_WINDOW / 2);
        let window_end = (pos + NEAREST_NEIGHBOR_WINDOW / 2 + 1).min(live_indices.len());
        let neighbors: Vec<f64> = (window_start..window_end)
            .filter(|&w| w != pos)
            .map(|w| haversine_distance_m(&points[live_indices[w]].position, &points[i].position))
            .collect();

        if is_boundary {
            let nearest = neighbors.iter().cloned().fold(f64::INFINITY, f64::min);
            if distance_from_median > 2.0 * cluster_radius_m && nearest > BOUNDARY_NEIGHBOR_DISTANCE_M {
                points[i].filtered = true;
                points[i].filter_reason = Some("precleanup-outlier".to_string());
                stats.precleanup_dropped += 1;
            }
        } else {
            let nearby_count = neighbors
                .iter()
                .filter(|&&d| d < INTERIOR_NEIGHBOR_DISTANCE_M)
                .count();
            if distance_from_median > 3.0 * cluster_radius_m && nearby_count < INTERIOR_MIN_NEIGHBORS {
                points[i].filtered = true;
                points[i].filter_reason = Some("precleanup-outlier".to_string());
                stats.precleanup_dropped += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(offset_secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn leaves_a_tight_cluster_untouched() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(0)),
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(60)),
            TrackPoint::raw(GeoPoint::new(46.02, 8.0), t(120)),
            TrackPoint::raw(GeoPoint::new(46.01, 7.99), t(180)),
        ];
        let stats = apply(&mut points);
        assert_eq!(stats.precleanup_dropped, 0);
    }
}
