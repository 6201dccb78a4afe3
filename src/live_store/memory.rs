//! In-memory fake of [`LiveStore`] for unit/integration tests, following
//! the teacher's `tests/common` fixture pattern of swapping a real backing
//! store for a process-local stand-in.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::device_address::DeviceAddress;
use crate::model::entities::{GroundObject, Pilot, Station, Thermal, TrackPoint};
use crate::model::geo::GeoPoint;

use super::error::LiveStoreError;
use super::LiveStore;

#[derive(Default)]
pub struct InMemoryLiveStore {
    pilots: Mutex<HashMap<DeviceAddress, Pilot>>,
    ground_objects: Mutex<HashMap<DeviceAddress, GroundObject>>,
    thermals: Mutex<HashMap<u64, Thermal>>,
    stations: Mutex<HashMap<DeviceAddress, Station>>,
    tracks: Mutex<HashMap<DeviceAddress, Vec<TrackPoint>>>,
}

impl InMemoryLiveStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn within_radius(center: &GeoPoint, point: &GeoPoint, radius_km: f64) -> bool {
    crate::geo::math::haversine_distance_m(center, point) <= radius_km * 1000.0
}

#[async_trait]
impl LiveStore for InMemoryLiveStore {
    async fn upsert_pilot(&self, pilot: &Pilot) -> Result<bool, LiveStoreError> {
        let mut pilots = self.pilots.lock().unwrap();
        if let Some(existing) = pilots.get(&pilot.address) {
            if existing.last_update >= pilot.last_update {
                return Ok(false);
            }
        }
        pilots.insert(pilot.address, pilot.clone());
        Ok(true)
    }

    async fn upsert_ground_object(&self, obj: &GroundObject) -> Result<bool, LiveStoreError> {
        let mut objs = self.ground_objects.lock().unwrap();
        if let Some(existing) = objs.get(&obj.address) {
            if existing.last_update >= obj.last_update {
                return Ok(false);
            }
        }
        objs.insert(obj.address, obj.clone());
        Ok(true)
    }

    async fn upsert_thermal(&self, thermal: &Thermal) -> Result<bool, LiveStoreError> {
        let mut thermals = self.thermals.lock().unwrap();
        if let Some(existing) = thermals.get(&thermal.id) {
            if existing.created_at >= thermal.created_at {
                return Ok(false);
            }
        }
        thermals.insert(thermal.id, thermal.clone());
        Ok(true)
    }

    async fn upsert_station(&self, station: &Station) -> Result<bool, LiveStoreError> {
        let mut stations = self.stations.lock().unwrap();
        if let Some(existing) = stations.get(&station.address) {
            if existing.last_update >= station.last_update {
                return Ok(false);
            }
        }
        stations.insert(station.address, station.clone());
        Ok(true)
    }

    async fn get_pilot(&self, address: DeviceAddress) -> Result<Option<Pilot>, LiveStoreError> {
        Ok(self.pilots.lock().unwrap().get(&address).cloned())
    }

    async fn query_pilots_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Pilot>, LiveStoreError> {
        Ok(self
            .pilots
            .lock()
            .unwrap()
            .values()
            .filter(|p| within_radius(center, &p.position, radius_km))
            .cloned()
            .collect())
    }

    async fn query_ground_objects_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<GroundObject>, LiveStoreError> {
        Ok(self
            .ground_objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| within_radius(center, &o.position, radius_km))
            .cloned()
            .collect())
    }

    async fn query_thermals_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Thermal>, LiveStoreError> {
        Ok(self
            .thermals
            .lock()
            .unwrap()
            .values()
            .filter(|t| within_radius(center, &t.position, radius_km))
            .cloned()
            .collect())
    }

    async fn query_stations_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Station>, LiveStoreError> {
        Ok(self
            .stations
            .lock()
            .unwrap()
            .values()
            .filter(|s| within_radius(center, &s.position, radius_km))
            .cloned()
            .collect())
    }

    async fn append_track(&self, address: DeviceAddress, point: &TrackPoint) -> Result<(), LiveStoreError> {
        let mut tracks = self.tracks.lock().unwrap();
        let list = tracks.entry(address).or_default();
        list.insert(0, point.clone());
        list.truncate(1000);
        Ok(())
    }

    async fn get_track(&self, address: DeviceAddress) -> Result<Vec<TrackPoint>, LiveStoreError> {
        let mut points = self.tracks.lock().unwrap().get(&address).cloned().unwrap_or_default();
        points.reverse();
        Ok(points)
    }

    async fn ping(&self) -> Result<(), LiveStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds::{AircraftKind, Visibility};
    use chrono::Utc;

    fn pilot(addr: u32, lat: f64, lon: f64, ts: chrono::DateTime<Utc>) -> Pilot {
        Pilot {
            address: DeviceAddress::new(addr).unwrap(),
            name: None,
            aircraft_kind: AircraftKind::Paraglider,
            position: GeoPoint::new(lat, lon),
            ground_speed_kmh: 0.0,
            climb_rate_dms: 0,
            heading_deg: 0,
            battery_pct: 100,
            track_online: true,
            last_update: ts,
            last_movement: ts,
            distance_from_center_m: 0.0,
            visibility: Visibility::Visible,
        }
    }

    #[tokio::test]
    async fn drops_stale_upsert() {
        let store = InMemoryLiveStore::new();
        let now = Utc::now();
        store.upsert_pilot(&pilot(1, 46.0, 8.0, now)).await.unwrap();
        let applied = store
            .upsert_pilot(&pilot(1, 46.0, 8.0, now - chrono::Duration::seconds(10)))
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn track_caps_at_1000_and_is_chronological() {
        let store = InMemoryLiveStore::new();
        let addr = DeviceAddress::new(1).unwrap();
        let base = Utc::now();
        for i in 0..1005 {
            let point = TrackPoint::raw(
                GeoPoint::new(46.0, 8.0),
                base + chrono::Duration::seconds(i),
            );
            store.append_track(addr, &point).await.unwrap();
        }
        let track = store.get_track(addr).await.unwrap();
        assert_eq!(track.len(), 1000);
        assert!(track.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
