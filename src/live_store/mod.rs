//! Geospatial key-value live store (§4.4).

pub mod error;
pub mod redis_store;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::model::device_address::DeviceAddress;
use crate::model::entities::{GroundObject, Pilot, Station, Thermal, TrackPoint};
use crate::model::geo::GeoPoint;

pub use error::LiveStoreError;
pub use redis_store::RedisLiveStore;

/// Geospatial key-value store with per-entity TTL and history lists.
///
/// Every upsert returns `true` if applied, `false` if dropped by the
/// timestamp-conflict rule (new timestamp older than the stored one).
#[async_trait]
pub trait LiveStore: Send + Sync {
    async fn upsert_pilot(&self, pilot: &Pilot) -> Result<bool, LiveStoreError>;
    async fn upsert_ground_object(&self, obj: &GroundObject) -> Result<bool, LiveStoreError>;
    async fn upsert_thermal(&self, thermal: &Thermal) -> Result<bool, LiveStoreError>;
    async fn upsert_station(&self, station: &Station) -> Result<bool, LiveStoreError>;

    /// Single-device lookup, used by the ingest pipeline to recover the
    /// prior position/last-movement needed by the boundary tracker.
    async fn get_pilot(&self, address: DeviceAddress) -> Result<Option<Pilot>, LiveStoreError>;

    async fn query_pilots_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Pilot>, LiveStoreError>;
    async fn query_ground_objects_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<GroundObject>, LiveStoreError>;
    async fn query_thermals_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Thermal>, LiveStoreError>;
    async fn query_stations_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Station>, LiveStoreError>;

    async fn append_track(&self, address: DeviceAddress, point: &TrackPoint) -> Result<(), LiveStoreError>;
    async fn get_track(&self, address: DeviceAddress) -> Result<Vec<TrackPoint>, LiveStoreError>;

    /// Cheap round trip used by the `/ready` readiness probe.
    async fn ping(&self) -> Result<(), LiveStoreError>;
}
