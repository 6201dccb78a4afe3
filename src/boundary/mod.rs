//! Boundary tracker: classifies a position against the OGN monitoring
//! disc so "stuck ghost" objects at the edge fade out rather than linger
//! forever (§4.3).

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::geo::math::haversine_distance_m;
use crate::model::geo::GeoPoint;
use crate::model::kinds::Visibility;

#[derive(Debug, Clone, Copy)]
pub struct BoundaryConfig {
    pub center: GeoPoint,
    pub outer_radius_km: f64,
    pub tracking_radius_km: f64,
    pub grace_period: ChronoDuration,
    pub min_movement_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryResult {
    pub in_tracking_zone: bool,
    pub in_monitoring_zone: bool,
    pub distance_m: f64,
    pub last_movement: DateTime<Utc>,
    pub visibility: Visibility,
    /// 1.0 at movement time, fading to 0.3 at grace expiry, then 0.0.
    pub visibility_score: f64,
}

impl BoundaryResult {
    /// Snapshot composition's include predicate (§4.3, §4.9):
    /// `in-tracking-zone ∨ (boundary ∧ within-grace)`.
    pub fn include(&self, now: DateTime<Utc>, grace_period: ChronoDuration) -> bool {
        self.in_tracking_zone
            || (self.visibility == Visibility::Boundary
                && now - self.last_movement <= grace_period)
    }
}

/// Snapshot composition's include predicate (§4.3, §4.9) applied to an
/// already-classified pilot pulled back out of the live store, where only
/// `visibility` and `last_movement` survive the round-trip.
pub fn include_in_snapshot(
    visibility: Visibility,
    last_movement: DateTime<Utc>,
    now: DateTime<Utc>,
    grace_period: ChronoDuration,
) -> bool {
    match visibility {
        Visibility::Visible => true,
        Visibility::Boundary => now - last_movement <= grace_period,
        Visibility::Outside => false,
    }
}

pub struct BoundaryTracker {
    config: BoundaryConfig,
}

impl BoundaryTracker {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Classify a position observation. `prior_position`/`prior_movement`
    /// carry the device's last known fix so "significant movement" can
    /// refresh `last_movement`; pass `None` for a device seen for the
    /// first time (treated as having just moved).
    pub fn observe(
        &self,
        position: &GeoPoint,
        now: DateTime<Utc>,
        prior_position: Option<&GeoPoint>,
        prior_movement: Option<DateTime<Utc>>,
    ) -> BoundaryResult {
        let distance_m = haversine_distance_m(&self.config.center, position);
        let tracking_m = self.config.tracking_radius_km * 1000.0;
        let outer_m = self.config.outer_radius_km * 1000.0;

        let moved_significantly = match prior_position {
            Some(prior) => haversine_distance_m(prior, position) > self.config.min_movement_m,
            None => true,
        };
        let last_movement = if moved_significantly {
            now
        } else {
            prior_movement.unwrap_or(now)
        };

        let in_tracking_zone = distance_m <= tracking_m;
        let in_monitoring_zone = distance_m <= outer_m;

        let visibility = if in_tracking_zone {
            Visibility::Visible
        } else if in_monitoring_zone {
            if now - last_movement > self.config.grace_period {
                Visibility::Outside
            } else {
                Visibility::Boundary
            }
        } else {
            Visibility::Outside
        };

        let visibility_score = match visibility {
            Visibility::Visible => 1.0,
            Visibility::Boundary => {
                let elapsed = (now - last_movement).num_milliseconds().max(0) as f64;
                let grace = self.config.grace_period.num_milliseconds().max(1) as f64;
                let fraction = (elapsed / grace).clamp(0.0, 1.0);
                1.0 - fraction * 0.7 // 1.0 at t=0 down to 0.3 at grace expiry
            }
            Visibility::Outside => 0.0,
        };

        BoundaryResult {
            in_tracking_zone,
            in_monitoring_zone,
            distance_m,
            last_movement,
            visibility,
            visibility_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> BoundaryConfig {
        BoundaryConfig {
            center: GeoPoint::new(46.5, 14.2),
            outer_radius_km: 200.0,
            tracking_radius_km: 180.0,
            grace_period: ChronoDuration::minutes(5),
            min_movement_m: 100.0,
        }
    }

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(offset_secs)
    }

    #[test]
    fn near_center_is_visible() {
        let tracker = BoundaryTracker::new(config());
        let result = tracker.observe(&GeoPoint::new(46.506, 14.2058), t(0), None, None);
        assert_eq!(result.visibility, Visibility::Visible);
        assert!(result.include(t(0), ChronoDuration::minutes(5)));
    }

    #[test]
    fn boundary_annulus_fades_after_grace() {
        let tracker = BoundaryTracker::new(config());
        let result = tracker.observe(&GeoPoint::new(47.7269, 14.5058), t(0), None, None);
        assert_eq!(result.visibility, Visibility::Boundary);
        assert!(result.include(t(0), ChronoDuration::minutes(5)));
        assert!(!result.include(t(6 * 60), ChronoDuration::minutes(5)));
    }

    #[test]
    fn outside_outer_radius_is_excluded() {
        let tracker = BoundaryTracker::new(config());
        let result = tracker.observe(&GeoPoint::new(48.0369, 14.5058), t(0), None, None);
        assert_eq!(result.visibility, Visibility::Outside);
        assert!(!result.include(t(0), ChronoDuration::minutes(5)));
    }
}
