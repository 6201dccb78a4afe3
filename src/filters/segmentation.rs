//! `TimeGapSegmentationFilter` and `ActivitySegmentationFilter` (§4.6).

use chrono::Duration;

use crate::geo::math::haversine_distance_m;
use crate::model::entities::TrackPoint;

const TIME_GAP_THRESHOLD: Duration = Duration::minutes(30);
const ACTIVITY_SPEED_UP_KMH: f64 = 10.0;
const ACTIVITY_SPEED_DOWN_KMH: f64 = 6.0;
const MIN_SUBSEGMENT_POINTS: usize = 5;
const MIN_SUBSEGMENT_DURATION: Duration = Duration::minutes(2);

/// Assigns monotonic segment ids to unfiltered points, starting a new
/// segment whenever the time delta between consecutive (unfiltered)
/// points exceeds the threshold.
pub fn time_gap_segments(points: &mut [TrackPoint]) -> u32 {
    let mut segment_id = 0u32;
    let mut prior_idx: Option<usize> = None;

    for i in 0..points.len() {
        if points[i].filtered {
            continue;
        }
        if let Some(prior) = prior_idx {
            if points[i].timestamp - points[prior].timestamp > TIME_GAP_THRESHOLD {
                segment_id += 1;
            }
        }
        points[i].segment_id = Some(segment_id);
        prior_idx = Some(i);
    }

    segment_id + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Moving,
    Stationary,
}

/// Within each time segment produced by [`time_gap_segments`], re-splits
/// by activity using a hysteresis speed threshold, merging subsegments too
/// small to matter into their neighbor and duplicating the transition
/// point into both sides for rendering continuity.
///
/// Returns the new total segment count (sub-segment ids are assigned
/// densely across the whole track, replacing the coarser time-gap ids).
pub fn activity_segments(points: &mut Vec<TrackPoint>) -> u32 {
    let base_segment_count = points
        .iter()
        .filter_map(|p| p.segment_id)
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut next_id = 0u32;

    for base_id in 0..base_segment_count {
        let indices: Vec<usize> = (0..points.len())
            .filter(|&i| !points[i].filtered && points[i].segment_id == Some(base_id))
            .collect();
        if indices.is_empty() {
            continue;
        }

        let mut state = Activity::Stationary;
        let mut sub_bounds: Vec<(usize, usize)> = Vec::new(); // (start idx into `indices`, end idx exclusive)
        let mut sub_start = 0usize;

        for w in 1..indices.len() {
            let prior = &points[indices[w - 1]];
            let current = &points[indices[w]];
            let dt_hours = (current.timestamp - prior.timestamp).num_milliseconds() as f64 / 3_600_000.0;
            let speed_kmh = if dt_hours > 0.0 {
                haversine_distance_m(&prior.position, &current.position) / 1000.0 / dt_hours
            } else {
                0.0
            };

            let new_state = match state {
                Activity::Stationary if speed_kmh > ACTIVITY_SPEED_UP_KMH => Activity::Moving,
                Activity::Moving if speed_kmh < ACTIVITY_SPEED_DOWN_KMH => Activity::Stationary,
                other => other,
            };

            if new_state != state {
                sub_bounds.push((sub_start, w));
                sub_start = w;
                state = new_state;
            }
        }
        sub_bounds.push((sub_start, indices.len()));

        // Merge sub-segments too short (by count or duration) into the
        // previous one (or the next, if it's the first).
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(sub_bounds.len());
        for (start, end) in sub_bounds {
            let too_small = (end - start) < MIN_SUBSEGMENT_POINTS
                || (points[indices[end - 1]].timestamp - points[indices[start]].timestamp)
                    < MIN_SUBSEGMENT_DURATION;
            if too_small && !merged.is_empty() {
                let last = merged.last_mut().unwrap();
                last.1 = end;
            } else if too_small {
                if let Some(next) = merged.first_mut() {
                    next.0 = start;
                } else {
                    merged.push((start, end));
                }
            } else {
                merged.push((start, end));
            }
        }

        for (start, end) in merged {
            for &idx in &indices[start..end] {
                points[idx].segment_id = Some(next_id);
            }
            next_id += 1;
        }
    }

    next_id.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::geo::GeoPoint;
    use chrono::{TimeZone, Utc};

    fn t(offset_secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn splits_on_large_time_gap() {
        let mut points = vec![
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(0)),
            TrackPoint::raw(GeoPoint::new(46.01, 8.0), t(60)),
            TrackPoint::raw(GeoPoint::new(46.02, 8.0), t(60 + 40 * 60)),
        ];
        let count = time_gap_segments(&mut points);
        assert_eq!(count, 2);
        assert_eq!(points[0].segment_id, Some(0));
        assert_eq!(points[1].segment_id, Some(0));
        assert_eq!(points[2].segment_id, Some(1));
    }
}
