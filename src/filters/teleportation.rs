//! `SmartTeleportationFilter` (§4.6): flags points that imply an
//! impossible jump, an absurd speed, a frozen repeat, or jittery
//! back-and-forth motion, relative to the points `DuplicateFilter` left
//! standing.

use std::collections::VecDeque;

use crate::geo::math::haversine_distance_m;
use crate::model::entities::TrackPoint;

use super::types::FilterStatistics;

const TELEPORT_DISTANCE_M: f64 = 200_000.0;
const SPEED_ABSOLUTE_KMH: f64 = 300.0;
const SPEED_MEDIAN_MULTIPLIER: f64 = 10.0;
const ROLLING_WINDOW: usize = 15;
const MASSIVE_DUPLICATE_RUN: usize = 5;
const MASSIVE_DUPLICATE_DISTANCE_M: f64 = 1.0;
const PING_PONG_WINDOW: usize = 10;
const PING_PONG_DISTANCE_M: f64 = 10.0;
const PING_PONG_MIN_HITS: usize = 3;

pub fn apply(points: &mut [TrackPoint]) -> FilterStatistics {
    let mut stats = FilterStatistics::default();
    let mut speed_window: VecDeque<f64> = VecDeque::with_capacity(ROLLING_WINDOW);
    let mut recent_positions: VecDeque<usize> = VecDeque::with_capacity(PING_PONG_WINDOW);
    let mut identical_run = 0usize;
    let mut prior_idx: Option<usize> = None;

    for i in 0..points.len() {
        if points[i].filtered {
            continue;
        }
        let Some(prior) = prior_idx else {
            prior_idx = Some(i);
            recent_positions.push_back(i);
            continue;
        };

        let prior_point = points[prior].clone();
        let current = points[i].clone();
        let distance_m = haversine_distance_m(&prior_point.position, &current.position);
        let time_delta_hours =
            (current.timestamp - prior_point.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let speed_kmh = if time_delta_hours > 0.0 {
            (distance_m / 1000.0) / time_delta_hours
        } else {
            f64::INFINITY
        };

        let median_speed = rolling_median(&speed_window);

        if distance_m > TELEPORT_DISTANCE_M {
            mark(&mut points[i], "teleportation");
            stats.teleportations += 1;
            continue;
        }

        if speed_kmh > SPEED_ABSOLUTE_KMH
            || (median_speed > 0.0 && speed_kmh > median_speed * SPEED_MEDIAN_MULTIPLIER)
        {
            mark(&mut points[i], "speed-violation");
            stats.speed_violations += 1;
            continue;
        }

        if distance_m < MASSIVE_DUPLICATE_DISTANCE_M {
            identical_run += 1;
        } else {
            identical_run = 0;
        }
        if identical_run >= MASSIVE_DUPLICATE_RUN {
            mark(&mut points[i], "massive-duplicate");
            stats.massive_duplicates += 1;
            continue;
        }

        let hits = recent_positions
            .iter()
            .filter(|&&idx| haversine_distance_m(&points[idx].position, &current.position) < PING_PONG_DISTANCE_M)
            .count();
        if recent_positions.len() >= PING_PONG_WINDOW && hits >= PING_PONG_MIN_HITS {
            mark(&mut points[i], "ping-pong");
            stats.ping_pongs += 1;
            continue;
        }

        // Accepted: update rolling state.
        if speed_window.len() == ROLLING_WINDOW {
            speed_window.pop_front();
        }
        speed_window.push_back(speed_kmh);
        if recent_positions.len() == PING_PONG_WINDOW {
            recent_positions.pop_front();
        }
        recent_positions.push_back(i);
        prior_idx = Some(i);
    }

    stats
}

fn mark(point: &mut TrackPoint, reason: &str) {
    point.filtered = true;
    point.filter_reason = Some(reason.to_string());
}

fn rolling_median(window: &VecDeque<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
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
    fn flags_200km_jump_as_teleportation() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(30)),
            TrackPoint::raw(GeoPoint::new(50.0, 12.0), t(31)),
        ];
        let stats = apply(&mut points);
        assert_eq!(stats.teleportations, 1);
        assert!(points[1].filtered);
    }

    #[test]
    fn allows_modest_incremental_movement() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(30)),
            TrackPoint::raw(GeoPoint::new(46.02, 8.02), t(60)),
        ];
        let stats = apply(&mut points);
        assert_eq!(stats.total_dropped(), 0);
        assert!(!points[1].filtered);
    }
}
