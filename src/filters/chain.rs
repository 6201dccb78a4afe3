use std::collections::BTreeMap;

use crate::geo::math::haversine_distance_m;
use crate::model::entities::TrackPoint;

use super::types::{color_for_speed, FilterStatistics, FilterLevel, FilteredTrack, SegmentSummary};
use super::{duplicate, precleanup, segmentation, teleportation};

/// Runs Level 1 (`DuplicateFilter -> SmartTeleportationFilter`) over a
/// single contiguous slice of points (used both for the top-level Level 1
/// pass and for `SegmentedFilterChain`'s per-segment pass).
fn level1(points: &mut [TrackPoint]) -> FilterStatistics {
    let mut stats = FilterStatistics::default();
    stats.duplicates += duplicate::apply(points);
    stats += &teleportation::apply(points);
    stats
}

pub fn run(points: Vec<TrackPoint>, level: FilterLevel) -> FilteredTrack {
    let original_count = points.len();
    let mut points = points;
    let mut stats = FilterStatistics::default();

    match level {
        FilterLevel::Raw => {}
        FilterLevel::Basic => {
            stats += &level1(&mut points);
        }
        FilterLevel::Medium | FilterLevel::Full => {
            stats += &precleanup::apply(&mut points);
            segmentation::time_gap_segments(&mut points);

            let segment_ids: Vec<u32> = {
                let mut ids: Vec<u32> = points.iter().filter_map(|p| p.segment_id).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            };
            for segment_id in segment_ids {
                let indices: Vec<usize> = (0..points.len())
                    .filter(|&i| points[i].segment_id == Some(segment_id) && !points[i].filtered)
                    .collect();
                // Run Level 1 on a scratch copy of the segment, then splice
                // the filtered flags back: `level1` needs a contiguous
                // slice, and the segment's indices in `points` generally
                // aren't contiguous.
                let mut scratch: Vec<TrackPoint> = indices.iter().map(|&i| points[i].clone()).collect();
                let segment_stats = level1(&mut scratch);
                stats += &segment_stats;
                for (pos, &i) in indices.iter().enumerate() {
                    points[i].filtered = scratch[pos].filtered;
                    points[i].filter_reason = scratch[pos].filter_reason.clone();
                }
            }

            if level == FilterLevel::Full {
                segmentation::activity_segments(&mut points);
            }
        }
    }

    let segments = if level >= FilterLevel::Medium {
        build_summaries(&points)
    } else {
        Vec::new()
    };

    let filtered_count = points.iter().filter(|p| !p.filtered).count();

    FilteredTrack {
        original_count,
        filtered_count,
        points,
        statistics: stats,
        segments,
    }
}

fn build_summaries(points: &[TrackPoint]) -> Vec<SegmentSummary> {
    let mut by_segment: BTreeMap<u32, Vec<(usize, &TrackPoint)>> = BTreeMap::new();
    for (index, point) in points.iter().enumerate() {
        if point.filtered {
            continue;
        }
        if let Some(segment_id) = point.segment_id {
            by_segment.entry(segment_id).or_default().push((index, point));
        }
    }

    by_segment
        .into_iter()
        .filter_map(|(segment_id, indexed_pts)| {
            if indexed_pts.is_empty() {
                return None;
            }
            let start_index = indexed_pts.first()?.0;
            let end_index = indexed_pts.last()?.0;
            let pts: Vec<&TrackPoint> = indexed_pts.iter().map(|&(_, p)| p).collect();
            let start_time = pts.first()?.timestamp;
            let end_time = pts.last()?.timestamp;
            let mut distance_m = 0.0;
            let mut speeds = Vec::with_capacity(pts.len());
            for window in pts.windows(2) {
                let d = haversine_distance_m(&window[0].position, &window[1].position);
                distance_m += d;
                let dt_hours = (window[1].timestamp - window[0].timestamp).num_milliseconds() as f64 / 3_600_000.0;
                if dt_hours > 0.0 {
                    speeds.push(d / 1000.0 / dt_hours);
                }
            }
            let mean_speed_kmh = if speeds.is_empty() {
                0.0
            } else {
                speeds.iter().sum::<f64>() / speeds.len() as f64
            };
            let max_speed_kmh = speeds.iter().cloned().fold(0.0, f64::max);

            Some(SegmentSummary {
                segment_id,
                start_index,
                end_index,
                start_time,
                end_time,
                duration_secs: (end_time - start_time).num_seconds(),
                distance_m,
                mean_speed_kmh,
                max_speed_kmh,
                point_count: pts.len(),
                color: color_for_speed(mean_speed_kmh),
            })
        })
        .collect()
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
    fn level1_matches_concrete_scenario() {
        let points = vec![
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(0)),
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(1)),
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(30)),
            TrackPoint::raw(GeoPoint::new(50.0, 12.0), t(31)),
            TrackPoint::raw(GeoPoint::new(46.02, 8.02), t(60)),
        ];
        let result = run(points, FilterLevel::Basic);
        let kept: Vec<bool> = result.points.iter().map(|p| !p.filtered).collect();
        assert_eq!(kept, vec![true, false, true, false, true]);
    }

    #[test]
    fn filter_monotonicity_across_levels() {
        let points = vec![
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(0)),
            TrackPoint::raw(GeoPoint::new(46.0, 8.0), t(1)),
            TrackPoint::raw(GeoPoint::new(46.01, 8.01), t(30)),
            TrackPoint::raw(GeoPoint::new(50.0, 12.0), t(31)),
            TrackPoint::raw(GeoPoint::new(46.02, 8.02), t(60)),
        ];
        let level1 = run(points.clone(), FilterLevel::Basic);
        let level2 = run(points, FilterLevel::Medium);
        assert!(level2.statistics.total_dropped() >= level1.statistics.total_dropped());
    }
}
