use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::entities::TrackPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLevel {
    Raw = 0,
    Basic = 1,
    Medium = 2,
    Full = 3,
}

impl FilterLevel {
    pub fn from_query(value: u8) -> Self {
        match value {
            1 => Self::Basic,
            2 => Self::Medium,
            3 => Self::Full,
            _ => Self::Raw,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStatistics {
    pub duplicates: usize,
    pub teleportations: usize,
    pub speed_violations: usize,
    pub massive_duplicates: usize,
    pub ping_pongs: usize,
    pub precleanup_dropped: usize,
}

impl FilterStatistics {
    pub fn total_dropped(&self) -> usize {
        self.duplicates
            + self.teleportations
            + self.speed_violations
            + self.massive_duplicates
            + self.ping_pongs
            + self.precleanup_dropped
    }

    fn merge(&mut self, other: &FilterStatistics) {
        self.duplicates += other.duplicates;
        self.teleportations += other.teleportations;
        self.speed_violations += other.speed_violations;
        self.massive_duplicates += other.massive_duplicates;
        self.ping_pongs += other.ping_pongs;
        self.precleanup_dropped += other.precleanup_dropped;
    }
}

impl std::ops::AddAssign<&FilterStatistics> for FilterStatistics {
    fn add_assign(&mut self, rhs: &FilterStatistics) {
        self.merge(rhs);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment_id: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub distance_m: f64,
    pub mean_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub point_count: usize,
    /// A CSS-ish hex color derived from mean speed, for client rendering.
    pub color: String,
}

/// Color ramp from slow (green) to fast (red), used by map clients to
/// shade track segments by mean speed.
pub fn color_for_speed(mean_speed_kmh: f64) -> String {
    let t = (mean_speed_kmh / 150.0).clamp(0.0, 1.0);
    let r = (t * 255.0) as u8;
    let g = ((1.0 - t) * 255.0) as u8;
    format!("#{r:02x}{g:02x}00")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredTrack {
    pub original_count: usize,
    pub filtered_count: usize,
    pub points: Vec<TrackPoint>,
    pub statistics: FilterStatistics,
    pub segments: Vec<SegmentSummary>,
}
