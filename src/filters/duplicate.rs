//! `DuplicateFilter` (§4.6): drops points that add no information over the
//! last accepted point — near-identical position, too-fast repeat, or part
//! of a tight cluster.

use crate::geo::math::haversine_distance_m;
use crate::model::entities::TrackPoint;

const MIN_DISTANCE_M: f64 = 10.0;
const MIN_TIME_DELTA_SECS: i64 = 5;
/// Distance bound paired with the time-delta check so a point that merely
/// arrives soon after the last one, but somewhere far away, is left for
/// `SmartTeleportationFilter` to classify rather than being called a
/// "duplicate". See DESIGN.md.
const SOFT_DUPLICATE_DISTANCE_M: f64 = 50.0;
const IDENTICAL_DECIMALS: f64 = 1_000_000.0; // 6 decimal places ~ 1 m
const CLUSTER_WINDOW: usize = 5;
const CLUSTER_DISTANCE_M: f64 = 100.0;

/// Marks duplicate points with `filtered = true` in place. Returns the
/// count dropped. Points already filtered by an earlier stage are left
/// untouched and excluded from the "prior accepted" reference.
pub fn apply(points: &mut [TrackPoint]) -> usize {
    let mut accepted_indices: Vec<usize> = Vec::new();
    let mut dropped = 0;

    for i in 0..points.len() {
        if points[i].filtered {
            continue;
        }
        let Some(&prior_idx) = accepted_indices.last() else {
            accepted_indices.push(i);
            continue;
        };

        let prior = points[prior_idx].clone();
        let current = &points[i];
        let distance_m = haversine_distance_m(&prior.position, &current.position);
        let time_delta_secs = (current.timestamp - prior.timestamp).num_seconds();

        let identical = (current.position.latitude * IDENTICAL_DECIMALS).round()
            == (prior.position.latitude * IDENTICAL_DECIMALS).round()
            && (current.position.longitude * IDENTICAL_DECIMALS).round()
                == (prior.position.longitude * IDENTICAL_DECIMALS).round();

        let window_start = accepted_indices.len().saturating_sub(CLUSTER_WINDOW);
        let nearby_in_window = accepted_indices[window_start..]
            .iter()
            .filter(|&&idx| haversine_distance_m(&points[idx].position, &current.position) < CLUSTER_DISTANCE_M)
            .count();
        let in_cluster = accepted_indices.len() >= CLUSTER_WINDOW && nearby_in_window * 2 > CLUSTER_WINDOW;

        let is_duplicate = distance_m < MIN_DISTANCE_M
            || identical
            || in_cluster
            || (time_delta_secs < MIN_TIME_DELTA_SECS && distance_m < SOFT_DUPLICATE_DISTANCE_M);

        if is_duplicate {
            points[i].filtered = true;
            points[i].filter_reason = Some("duplicate".to_string());
            dropped += 1;
        } else {
            accepted_indices.push(i);
        }
    }

    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::geo::GeoPoint;
    use chrono::{Duration, TimeZone, Utc};

    fn t(offset_secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn drops_near_identical_back_to_back_point() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(0)),
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(1)),
        ];
        let dropped = apply(&mut points);
        assert_eq!(dropped, 1);
        assert!(points[1].filtered);
    }

    #[test]
    fn keeps_a_legitimate_fast_far_jump_for_the_teleportation_filter() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(30)),
            TrackPoint::raw(GeoPoint::new(50.0, 12.0), t(31)),
        ];
        let dropped = apply(&mut points);
        assert_eq!(dropped, 0);
    }
}
