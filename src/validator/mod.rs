//! Per-device plausibility validator with hysteresis (§4.2).
//!
//! A plain state map keyed by device, no process-wide singletons (§9).
//! Callers are responsible for hash-dispatching packets by device address
//! to a single worker so this sees in-order timestamps per device; the map
//! itself only needs to protect concurrent growth against concurrent
//! reads, which `DashMap` already does shard-locally.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use crate::geo::math::haversine_distance_m;
use crate::model::device_address::DeviceAddress;
use crate::model::geo::GeoPoint;
use crate::model::kinds::AircraftKind;
use crate::model::validation::{ValidationOutcome, ValidationState};

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub initial_score: i32,
    pub valid_bonus: i32,
    pub invalid_penalty: i32,
    pub max_score: i32,
    pub add_threshold: i32,
    pub remove_threshold: i32,
    pub max_time_delta: ChronoDuration,
    pub speed_multiplier: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            initial_score: 20,
            valid_bonus: 5,
            invalid_penalty: -10,
            max_score: 100,
            add_threshold: 50,
            remove_threshold: 10,
            max_time_delta: ChronoDuration::minutes(10),
            speed_multiplier: 1.5,
        }
    }
}

pub struct Validator {
    config: ValidatorConfig,
    states: DashMap<DeviceAddress, ValidationState>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ValidatorSummary {
    pub tracked_devices: usize,
    pub validated_devices: usize,
    pub mean_score: f64,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Score an incoming Pilot observation. `position` is `None` for
    /// packets that carry no coordinates (e.g. a bare name packet).
    pub fn observe(
        &self,
        address: DeviceAddress,
        position: Option<GeoPoint>,
        timestamp: DateTime<Utc>,
        kind: AircraftKind,
    ) -> ValidationOutcome {
        let mut entry = self
            .states
            .entry(address)
            .or_insert_with(|| {
                let mut state = ValidationState::new(timestamp, kind, self.config.initial_score);
                state.aircraft_kind = kind;
                state
            });

        // Step 1: brand new device, never published on its first packet.
        if entry.packet_count == 0 {
            entry.packet_count += 1;
            entry.last_position = position;
            entry.last_update = timestamp;
            return ValidationOutcome {
                valid: false,
                publish: false,
            };
        }
        entry.packet_count += 1;

        // Step 2: missing coordinates on either side.
        let (current, prior) = match (position, entry.last_position) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                entry.score = (entry.score + self.config.invalid_penalty).max(0);
                entry.last_update = timestamp;
                self.apply_hysteresis(&mut entry);
                return ValidationOutcome {
                    valid: false,
                    publish: entry.is_validated,
                };
            }
        };

        // Step 3: non-positive or excessive time delta.
        let time_delta = timestamp - entry.last_update;
        if time_delta <= ChronoDuration::zero() || time_delta > self.config.max_time_delta {
            entry.last_position = Some(current);
            entry.last_update = timestamp;
            entry.score = (entry.score + self.config.invalid_penalty).max(0);
            self.apply_hysteresis(&mut entry);
            return ValidationOutcome {
                valid: false,
                publish: entry.is_validated,
            };
        }

        // Steps 4-6: plausibility by implied speed.
        let distance_m = haversine_distance_m(&prior, &current);
        let time_delta_hours = time_delta.num_milliseconds() as f64 / 3_600_000.0;
        let speed_kmh = (distance_m / 1000.0) / time_delta_hours;
        let max_speed = entry.aircraft_kind.max_speed_kmh() * self.config.speed_multiplier;

        let valid = speed_kmh <= max_speed;
        if valid {
            entry.score = (entry.score + self.config.valid_bonus).min(self.config.max_score);
            entry.consecutive_invalid = 0;
            entry.last_position = Some(current);
            entry.last_update = timestamp;
        } else {
            entry.score = (entry.score + self.config.invalid_penalty).max(0);
            entry.consecutive_invalid += 1;
            entry.last_update = timestamp;
            entry.last_position = Some(current);
        }

        // Step 7: hysteresis.
        self.apply_hysteresis(&mut entry);

        ValidationOutcome {
            valid,
            publish: entry.is_validated,
        }
    }

    fn apply_hysteresis(&self, entry: &mut ValidationState) {
        if !entry.is_validated && entry.score >= self.config.add_threshold {
            entry.is_validated = true;
        } else if entry.is_validated && entry.score <= self.config.remove_threshold {
            entry.is_validated = false;
        }
    }

    pub fn state(&self, address: DeviceAddress) -> Option<ValidationState> {
        self.states.get(&address).map(|e| e.clone())
    }

    /// Operator control: force a device back to unvalidated with a score
    /// below the remove threshold, per `POST /invalidate/{addr}` (§6).
    pub fn invalidate(&self, address: DeviceAddress) -> bool {
        if let Some(mut entry) = self.states.get_mut(&address) {
            entry.is_validated = false;
            entry.score = self.config.remove_threshold.min(entry.score);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Aggregate counts for `GET /api/v1/validation/metrics` (§6).
    pub fn summary(&self) -> ValidatorSummary {
        let mut summary = ValidatorSummary {
            tracked_devices: self.states.len(),
            validated_devices: 0,
            mean_score: 0.0,
        };
        let mut score_total = 0i64;
        for entry in self.states.iter() {
            if entry.is_validated {
                summary.validated_devices += 1;
            }
            score_total += entry.score as i64;
        }
        if summary.tracked_devices > 0 {
            summary.mean_score = score_total as f64 / summary.tracked_devices as f64;
        }
        summary
    }

    /// Evict validator state untouched since before `horizon`. Run
    /// periodically so long-silent devices don't leak memory (§3, §9).
    pub fn sweep(&self, now: DateTime<Utc>, horizon: ChronoDuration) {
        self.states
            .retain(|_, state| now - state.last_update <= horizon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(offset_secs)
    }

    #[test]
    fn first_packet_is_never_published() {
        let v = Validator::new(ValidatorConfig::default());
        let addr = DeviceAddress::new(0xABC123).unwrap();
        let outcome = v.observe(
            addr,
            Some(GeoPoint::new(46.0, 8.0)),
            t(0),
            AircraftKind::Paraglider,
        );
        assert_eq!(outcome, ValidationOutcome { valid: false, publish: false });
    }

    #[test]
    fn realistic_speed_eventually_publishes() {
        let v = Validator::new(ValidatorConfig::default());
        let addr = DeviceAddress::new(0xABC123).unwrap();
        v.observe(addr, Some(GeoPoint::new(46.0, 8.0)), t(0), AircraftKind::Paraglider);

        let mut published = false;
        let mut lat = 46.0;
        for i in 1..=6 {
            lat += 0.018; // ~2 km per step
            let outcome = v.observe(
                addr,
                Some(GeoPoint::new(lat, 8.0)),
                t(i * 300),
                AircraftKind::Paraglider,
            );
            assert!(outcome.valid);
            if outcome.publish {
                published = true;
            }
        }
        assert!(published);
        let state = v.state(addr).unwrap();
        assert!(state.is_validated);
    }

    #[test]
    fn unrealistic_speed_rejected_and_resets_reference() {
        let v = Validator::new(ValidatorConfig::default());
        let addr = DeviceAddress::new(0xABC123).unwrap();
        v.observe(addr, Some(GeoPoint::new(46.0, 8.0)), t(0), AircraftKind::Paraglider);

        let outcome = v.observe(
            addr,
            Some(GeoPoint::new(46.5, 8.0)),
            t(60),
            AircraftKind::Paraglider,
        );
        assert_eq!(outcome, ValidationOutcome { valid: false, publish: false });
        let state = v.state(addr).unwrap();
        assert_eq!(state.last_position.unwrap().latitude, 46.5);
        assert_eq!(state.score, 10); // 20 - 10
    }

    #[test]
    fn validated_survives_single_invalid_packet_above_remove_threshold() {
        let config = ValidatorConfig::default();
        let v = Validator::new(config);
        let addr = DeviceAddress::new(1).unwrap();
        v.observe(addr, Some(GeoPoint::new(0.0, 0.0)), t(0), AircraftKind::Glider);
        // Push score well above add-threshold with valid packets.
        let mut lat = 0.0;
        for i in 1..=8 {
            lat += 0.01;
            v.observe(addr, Some(GeoPoint::new(lat, 0.0)), t(i * 60), AircraftKind::Glider);
        }
        assert!(v.state(addr).unwrap().is_validated);

        // One wild jump: penalty alone must not cross remove-threshold.
        v.observe(addr, Some(GeoPoint::new(50.0, 50.0)), t(8 * 60 + 1), AircraftKind::Glider);
        assert!(v.state(addr).unwrap().is_validated);
    }
}
