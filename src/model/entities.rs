use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device_address::DeviceAddress;
use super::geo::GeoPoint;
use super::kinds::{AircraftKind, GroundKind, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pilot {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub aircraft_kind: AircraftKind,
    pub position: GeoPoint,
    pub ground_speed_kmh: f64,
    /// Signed tenths of m/s.
    pub climb_rate_dms: i16,
    pub heading_deg: u16,
    pub battery_pct: u8,
    pub track_online: bool,
    pub last_update: DateTime<Utc>,
    pub last_movement: DateTime<Utc>,
    pub distance_from_center_m: f64,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundObject {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub ground_kind: GroundKind,
    pub position: GeoPoint,
    pub last_update: DateTime<Utc>,
    pub track_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thermal {
    pub id: u64,
    pub reporter_address: DeviceAddress,
    pub position: GeoPoint,
    pub quality: u8,
    /// Tenths of m/s.
    pub climb_dms: i16,
    pub wind_speed_ms: f64,
    pub wind_heading_deg: u16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub position: GeoPoint,
    pub temperature_c: f64,
    pub wind_speed_ms: f64,
    pub wind_heading_deg: u16,
    pub wind_gusts_ms: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub battery_pct: u8,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPoint {
    pub position: GeoPoint,
    pub timestamp: DateTime<Utc>,
    pub speed_kmh: Option<f64>,
    pub distance_from_previous_m: Option<f64>,
    pub filtered: bool,
    pub filter_reason: Option<String>,
    pub segment_id: Option<u32>,
}

impl TrackPoint {
    pub fn raw(position: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            timestamp,
            speed_kmh: None,
            distance_from_previous_m: None,
            filtered: false,
            filter_reason: None,
            segment_id: None,
        }
    }
}

/// A decoded entity, tagged by kind, sharing `address/position/timestamp`
/// per §9 ("Dynamic typing of entity records").
#[derive(Debug, Clone)]
pub enum EntityRecord {
    Pilot {
        address: DeviceAddress,
        position: Option<GeoPoint>,
        timestamp: DateTime<Utc>,
        aircraft_kind: AircraftKind,
        ground_speed_kmh: Option<f64>,
        climb_rate_dms: Option<i16>,
        heading_deg: Option<u16>,
        battery_pct: Option<u8>,
        name: Option<String>,
    },
    GroundObject {
        address: DeviceAddress,
        position: GeoPoint,
        timestamp: DateTime<Utc>,
        ground_kind: GroundKind,
        track_online: bool,
    },
    Thermal {
        address: DeviceAddress,
        position: GeoPoint,
        timestamp: DateTime<Utc>,
        quality: u8,
        climb_dms: i16,
        wind_speed_ms: f64,
        wind_heading_deg: u16,
    },
    Station {
        address: DeviceAddress,
        position: GeoPoint,
        timestamp: DateTime<Utc>,
        temperature_c: f64,
        wind_speed_ms: f64,
        wind_heading_deg: u16,
        wind_gusts_ms: f64,
        humidity_pct: u8,
        pressure_hpa: f64,
        battery_pct: u8,
    },
}

impl EntityRecord {
    pub fn address(&self) -> DeviceAddress {
        match self {
            Self::Pilot { address, .. }
            | Self::GroundObject { address, .. }
            | Self::Thermal { address, .. }
            | Self::Station { address, .. } => *address,
        }
    }
}
