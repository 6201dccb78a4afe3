use chrono::{DateTime, Utc};
use serde::Serialize;

use super::geo::GeoPoint;
use super::kinds::AircraftKind;

/// Per-device validator state. In-memory only; outlives entity eviction
/// and is cleaned by a separate horizon-based sweep (§3, §9).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationState {
    pub first_seen: DateTime<Utc>,
    pub last_position: Option<GeoPoint>,
    pub last_update: DateTime<Utc>,
    pub aircraft_kind: AircraftKind,
    pub packet_count: u64,
    pub score: i32,
    pub consecutive_invalid: u32,
    pub is_validated: bool,
}

impl ValidationState {
    pub fn new(now: DateTime<Utc>, aircraft_kind: AircraftKind, initial_score: i32) -> Self {
        Self {
            first_seen: now,
            last_position: None,
            last_update: now,
            aircraft_kind,
            packet_count: 0,
            score: initial_score,
            consecutive_invalid: 0,
            is_validated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub publish: bool,
}
