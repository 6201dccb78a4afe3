//! Integration tests for the relational persistence layer (§4.5, §4.6).
//!
//! Requires a reachable MySQL server (`TEST_MYSQL_DSN`, defaults to
//! `mysql://root@localhost/fanethub_test`); each test creates and drops its
//! own database via `common::TestDatabase` so they can run in parallel.
mod common;

use chrono::{TimeZone, Utc};
use common::TestDatabase;
use fanethub::db::repo;
use fanethub::model::device_address::DeviceAddress;
use fanethub::model::entities::{Pilot, Thermal};
use fanethub::model::geo::GeoPoint;
use fanethub::model::kinds::{AircraftKind, Visibility};

fn pilot(address: u32, lat: f64, lon: f64, at: chrono::DateTime<Utc>) -> Pilot {
    Pilot {
        address: DeviceAddress::new(address).unwrap(),
        name: Some("Test Pilot".to_string()),
        aircraft_kind: AircraftKind::Paraglider,
        position: GeoPoint::new(lat, lon),
        ground_speed_kmh: 24.0,
        climb_rate_dms: 5,
        heading_deg: 270,
        battery_pct: 88,
        track_online: true,
        last_update: at,
        last_movement: at,
        distance_from_center_m: 1000.0,
        visibility: Visibility::Visible,
    }
}

#[tokio::test]
async fn pilot_history_round_trips_in_chronological_order() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();
    let addr = 0xABC123;
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let batch = vec![
        pilot(addr, 46.0, 8.0, t0),
        pilot(addr, 46.01, 8.01, t0 + chrono::Duration::minutes(5)),
        pilot(addr, 46.02, 8.02, t0 + chrono::Duration::minutes(10)),
    ];

    {
        let mut conn = pool.get().unwrap();
        let written = repo::insert_pilot_batch(&mut conn, &batch).expect("insert batch");
        assert_eq!(written, 3);
    }

    let track = {
        let mut conn = pool.get().unwrap();
        repo::select_pilot_track(&mut conn, addr).expect("select track")
    };

    assert_eq!(track.len(), 3);
    assert!(track.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!((track[0].position.latitude - 46.0).abs() < 1e-6);
    assert!((track[2].position.latitude - 46.02).abs() < 1e-6);
}

#[tokio::test]
async fn pilot_history_is_scoped_per_device() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    {
        let mut conn = pool.get().unwrap();
        repo::insert_pilot_batch(&mut conn, &[pilot(1, 10.0, 10.0, t0)]).unwrap();
        repo::insert_pilot_batch(&mut conn, &[pilot(2, 20.0, 20.0, t0)]).unwrap();
    }

    let mut conn = pool.get().unwrap();
    let track_one = repo::select_pilot_track(&mut conn, 1).unwrap();
    let track_two = repo::select_pilot_track(&mut conn, 2).unwrap();
    assert_eq!(track_one.len(), 1);
    assert_eq!(track_two.len(), 1);
    assert!((track_one[0].position.latitude - 10.0).abs() < 1e-6);
}

#[tokio::test]
async fn thermal_batch_insert_reports_row_count() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let batch = vec![
        Thermal {
            id: 1,
            reporter_address: DeviceAddress::new(1).unwrap(),
            position: GeoPoint::new(46.5, 14.2),
            quality: 4,
            climb_dms: 35,
            wind_speed_ms: 3.5,
            wind_heading_deg: 180,
            created_at: t0,
        },
        Thermal {
            id: 2,
            reporter_address: DeviceAddress::new(2).unwrap(),
            position: GeoPoint::new(46.6, 14.3),
            quality: 3,
            climb_dms: 22,
            wind_speed_ms: 2.0,
            wind_heading_deg: 90,
            created_at: t0,
        },
    ];

    let mut conn = pool.get().unwrap();
    let written = repo::insert_thermal_batch(&mut conn, &batch).expect("insert batch");
    assert_eq!(written, 2);
}
