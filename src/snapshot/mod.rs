//! Snapshot composer (§4.9): the initial full-region state handed to a
//! client on WebSocket subscribe, and the `GET /snapshot` response body.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::boundary::include_in_snapshot;
use crate::live_store::{LiveStore, LiveStoreError};
use crate::model::entities::{GroundObject, Pilot, Station, Thermal};
use crate::model::geo::GeoPoint;

pub const MAX_RADIUS_KM: f64 = 200.0;

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub pilots: Vec<Pilot>,
    pub ground_objects: Vec<GroundObject>,
    pub thermals: Vec<Thermal>,
    pub stations: Vec<Station>,
    pub sequence: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("radius {0}km exceeds the {MAX_RADIUS_KM}km maximum")]
    RadiusTooLarge(f64),
    #[error(transparent)]
    LiveStore(#[from] LiveStoreError),
}

pub struct SnapshotComposer {
    store: Arc<dyn LiveStore>,
    grace_period: ChronoDuration,
}

impl SnapshotComposer {
    pub fn new(store: Arc<dyn LiveStore>, grace_period: ChronoDuration) -> Self {
        Self {
            store,
            grace_period,
        }
    }

    pub async fn compose(
        &self,
        center: GeoPoint,
        radius_km: f64,
        sequence: u64,
    ) -> Result<Snapshot, SnapshotError> {
        self.compose_at(center, radius_km, sequence, Utc::now()).await
    }

    /// `now` is threaded through explicitly so the boundary/grace-period
    /// cutoff is testable without depending on the wall clock.
    pub async fn compose_at(
        &self,
        center: GeoPoint,
        radius_km: f64,
        sequence: u64,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, SnapshotError> {
        if radius_km > MAX_RADIUS_KM {
            return Err(SnapshotError::RadiusTooLarge(radius_km));
        }

        let (pilots, ground_objects, thermals, stations) = tokio::try_join!(
            self.store.query_pilots_radius(&center, radius_km),
            self.store.query_ground_objects_radius(&center, radius_km),
            self.store.query_thermals_radius(&center, radius_km),
            self.store.query_stations_radius(&center, radius_km),
        )?;

        let pilots = pilots
            .into_iter()
            .filter(|pilot| {
                include_in_snapshot(pilot.visibility, pilot.last_movement, now, self.grace_period)
            })
            .collect();

        Ok(Snapshot {
            pilots,
            ground_objects,
            thermals,
            stations,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_store::memory::InMemoryLiveStore;
    use crate::model::device_address::DeviceAddress;
    use crate::model::kinds::{AircraftKind, Visibility};

    fn pilot(addr: u32, visibility: Visibility, last_movement: DateTime<Utc>) -> Pilot {
        Pilot {
            address: DeviceAddress::new(addr).unwrap(),
            name: None,
            aircraft_kind: AircraftKind::Paraglider,
            position: GeoPoint::new(46.5, 14.2),
            ground_speed_kmh: 20.0,
            climb_rate_dms: 0,
            heading_deg: 0,
            battery_pct: 90,
            track_online: true,
            last_update: last_movement,
            last_movement,
            distance_from_center_m: 0.0,
            visibility,
        }
    }

    #[tokio::test]
    async fn excludes_pilots_outside_grace_period() {
        let store = Arc::new(InMemoryLiveStore::new());
        let now = Utc::now();
        store
            .upsert_pilot(&pilot(1, Visibility::Visible, now))
            .await
            .unwrap();
        store
            .upsert_pilot(&pilot(2, Visibility::Boundary, now - ChronoDuration::minutes(10)))
            .await
            .unwrap();

        let composer = SnapshotComposer::new(store, ChronoDuration::minutes(5));
        let snapshot = composer
            .compose_at(GeoPoint::new(46.5, 14.2), 50.0, 1, now)
            .await
            .unwrap();

        assert_eq!(snapshot.pilots.len(), 1);
        assert_eq!(snapshot.pilots[0].address, DeviceAddress::new(1).unwrap());
        assert_eq!(snapshot.sequence, 1);
    }

    #[tokio::test]
    async fn rejects_radius_over_maximum() {
        let store = Arc::new(InMemoryLiveStore::new());
        let composer = SnapshotComposer::new(store, ChronoDuration::minutes(5));
        let err = composer
            .compose(GeoPoint::new(46.5, 14.2), 201.0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::RadiusTooLarge(_)));
    }
}
