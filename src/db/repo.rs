//! Synchronous diesel repository functions, run inside
//! `tokio::task::spawn_blocking` by the batch writer, matching the
//! teacher's `device_repo.rs` pattern of keeping diesel calls fully sync
//! and hopping threads at the call site rather than inside the repo.

use diesel::prelude::*;

use crate::model::entities::{Pilot, Station, Thermal, TrackPoint};
use crate::model::geo::GeoPoint;

use super::pool::MysqlPooledConnection;
use super::schema::{pilot_history, station_history, thermal_history};

#[derive(Insertable)]
#[diesel(table_name = pilot_history)]
struct NewPilotHistory {
    address: u32,
    name: Option<String>,
    aircraft_kind: u8,
    latitude: f64,
    longitude: f64,
    altitude_m: Option<i16>,
    ground_speed_kmh: f64,
    climb_rate_dms: i16,
    heading_deg: u16,
    battery_pct: u8,
    recorded_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = thermal_history)]
struct NewThermalHistory {
    thermal_id: u64,
    reporter_address: u32,
    latitude: f64,
    longitude: f64,
    quality: u8,
    climb_dms: i16,
    wind_speed_ms: f64,
    wind_heading_deg: u16,
    recorded_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = station_history)]
struct NewStationHistory {
    address: u32,
    name: Option<String>,
    latitude: f64,
    longitude: f64,
    temperature_c: f64,
    wind_speed_ms: f64,
    wind_heading_deg: u16,
    wind_gusts_ms: f64,
    humidity_pct: u8,
    pressure_hpa: f64,
    battery_pct: u8,
    recorded_at: chrono::NaiveDateTime,
}

pub fn insert_pilot_batch(conn: &mut MysqlPooledConnection, batch: &[Pilot]) -> QueryResult<usize> {
    let rows: Vec<NewPilotHistory> = batch
        .iter()
        .map(|p| NewPilotHistory {
            address: p.address.as_u32(),
            name: p.name.clone(),
            aircraft_kind: p.aircraft_kind as u8,
            latitude: p.position.latitude,
            longitude: p.position.longitude,
            altitude_m: p.position.altitude_m,
            ground_speed_kmh: p.ground_speed_kmh,
            climb_rate_dms: p.climb_rate_dms,
            heading_deg: p.heading_deg,
            battery_pct: p.battery_pct,
            recorded_at: p.last_update.naive_utc(),
        })
        .collect();

    conn.transaction(|conn| {
        diesel::insert_into(pilot_history::table)
            .values(&rows)
            .execute(conn)
    })
}

pub fn insert_thermal_batch(conn: &mut MysqlPooledConnection, batch: &[Thermal]) -> QueryResult<usize> {
    let rows: Vec<NewThermalHistory> = batch
        .iter()
        .map(|t| NewThermalHistory {
            thermal_id: t.id,
            reporter_address: t.reporter_address.as_u32(),
            latitude: t.position.latitude,
            longitude: t.position.longitude,
            quality: t.quality,
            climb_dms: t.climb_dms,
            wind_speed_ms: t.wind_speed_ms,
            wind_heading_deg: t.wind_heading_deg,
            recorded_at: t.created_at.naive_utc(),
        })
        .collect();

    conn.transaction(|conn| {
        diesel::insert_into(thermal_history::table)
            .values(&rows)
            .execute(conn)
    })
}

pub fn insert_station_batch(conn: &mut MysqlPooledConnection, batch: &[Station]) -> QueryResult<usize> {
    let rows: Vec<NewStationHistory> = batch
        .iter()
        .map(|s| NewStationHistory {
            address: s.address.as_u32(),
            name: s.name.clone(),
            latitude: s.position.latitude,
            longitude: s.position.longitude,
            temperature_c: s.temperature_c,
            wind_speed_ms: s.wind_speed_ms,
            wind_heading_deg: s.wind_heading_deg,
            wind_gusts_ms: s.wind_gusts_ms,
            humidity_pct: s.humidity_pct,
            pressure_hpa: s.pressure_hpa,
            battery_pct: s.battery_pct,
            recorded_at: s.last_update.naive_utc(),
        })
        .collect();

    conn.transaction(|conn| {
        diesel::insert_into(station_history::table)
            .values(&rows)
            .execute(conn)
    })
}

/// Selects a device's full persisted history, oldest first, for the track
/// filter engine (§4.6). Unlike the live store's `track:<addr>` list (capped
/// at 1000 points), this table is append-only, so a long-lived device's
/// track here can exceed what the live store still holds (§9).
pub fn select_pilot_track(
    conn: &mut MysqlPooledConnection,
    address: u32,
) -> QueryResult<Vec<TrackPoint>> {
    use chrono::{TimeZone, Utc};

    let rows: Vec<(f64, f64, Option<i16>, chrono::NaiveDateTime)> = pilot_history::table
        .filter(pilot_history::address.eq(address))
        .order(pilot_history::recorded_at.asc())
        .select((
            pilot_history::latitude,
            pilot_history::longitude,
            pilot_history::altitude_m,
            pilot_history::recorded_at,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(lat, lon, alt, recorded_at)| {
            let position = match alt {
                Some(alt) => GeoPoint::with_altitude(lat, lon, alt),
                None => GeoPoint::new(lat, lon),
            };
            TrackPoint::raw(position, Utc.from_utc_datetime(&recorded_at))
        })
        .collect())
}
