//! Redis-backed implementation of [`LiveStore`] (§4.4, §6 key layout).
//!
//! Compound "hash + geo index" writes are applied through a single Lua
//! script so the two effects commit atomically and so the timestamp
//! conflict check ("new < stored => drop") can read-then-write without a
//! round trip, per §4.4 and §9's note on the pipelined/scripted primitive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::model::device_address::DeviceAddress;
use crate::model::entities::{GroundObject, Pilot, Station, Thermal, TrackPoint};
use crate::model::geo::GeoPoint;

use super::error::LiveStoreError;
use super::LiveStore;

const TRACK_MAX_LEN: isize = 1000;

const PILOT_TTL_SECS: i64 = 12 * 3600;
const THERMAL_TTL_SECS: i64 = 6 * 3600;
const STATION_TTL_SECS: i64 = 24 * 3600;

/// Upserts `key`'s hash (last_update + data) and `geo_key`'s geo member in
/// one transaction, dropping the write if `last_update` in the store is
/// already >= the incoming timestamp.
const UPSERT_SCRIPT: &str = r#"
local key = KEYS[1]
local geo_key = KEYS[2]
local member = ARGV[1]
local new_ts = tonumber(ARGV[2])
local data = ARGV[3]
local lon = tonumber(ARGV[4])
local lat = tonumber(ARGV[5])
local ttl = tonumber(ARGV[6])

local stored_ts = redis.call('HGET', key, 'last_update')
if stored_ts and tonumber(stored_ts) >= new_ts then
    return 0
end

redis.call('HSET', key, 'last_update', new_ts, 'data', data)
redis.call('EXPIRE', key, ttl)
redis.call('GEOADD', geo_key, lon, lat, member)
return 1
"#;

pub struct RedisLiveStore {
    conn: ConnectionManager,
}

impl RedisLiveStore {
    pub async fn connect(url: &str) -> Result<Self, LiveStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    async fn upsert(
        &self,
        key: String,
        geo_key: &str,
        member: String,
        timestamp: DateTime<Utc>,
        data: String,
        position: GeoPoint,
        ttl_secs: i64,
    ) -> Result<bool, LiveStoreError> {
        let mut conn = self.conn.clone();
        let applied: i64 = Script::new(UPSERT_SCRIPT)
            .key(key)
            .key(geo_key)
            .arg(member)
            .arg(timestamp.timestamp_millis())
            .arg(data)
            .arg(position.longitude)
            .arg(position.latitude)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn query_radius_members(
        &self,
        geo_key: &str,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<String>, LiveStoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("GEORADIUS")
            .arg(geo_key)
            .arg(center.longitude)
            .arg(center.latitude)
            .arg(radius_km)
            .arg("km")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }
}

#[async_trait]
impl LiveStore for RedisLiveStore {
    async fn upsert_pilot(&self, pilot: &Pilot) -> Result<bool, LiveStoreError> {
        let data = serde_json::to_string(pilot)?;
        self.upsert(
            format!("pilot:{}", pilot.address),
            "pilots:geo",
            pilot.address.to_string(),
            pilot.last_update,
            data,
            pilot.position,
            PILOT_TTL_SECS,
        )
        .await
    }

    async fn upsert_ground_object(&self, obj: &GroundObject) -> Result<bool, LiveStoreError> {
        let data = serde_json::to_string(obj)?;
        self.upsert(
            format!("ground:{}", obj.address),
            "ground_objects:geo",
            obj.address.to_string(),
            obj.last_update,
            data,
            obj.position,
            PILOT_TTL_SECS,
        )
        .await
    }

    async fn upsert_thermal(&self, thermal: &Thermal) -> Result<bool, LiveStoreError> {
        let data = serde_json::to_string(thermal)?;
        let applied = self
            .upsert(
                format!("thermal:{}", thermal.id),
                "thermals:geo",
                thermal.id.to_string(),
                thermal.created_at,
                data,
                thermal.position,
                THERMAL_TTL_SECS,
            )
            .await?;
        if applied {
            let mut conn = self.conn.clone();
            let _: () = conn
                .zadd(
                    "thermals:time",
                    thermal.id.to_string(),
                    thermal.created_at.timestamp(),
                )
                .await?;
        }
        Ok(applied)
    }

    async fn upsert_station(&self, station: &Station) -> Result<bool, LiveStoreError> {
        let data = serde_json::to_string(station)?;
        self.upsert(
            format!("station:{}", station.address),
            "stations:geo",
            station.address.to_string(),
            station.last_update,
            data,
            station.position,
            STATION_TTL_SECS,
        )
        .await
    }

    async fn get_pilot(&self, address: DeviceAddress) -> Result<Option<Pilot>, LiveStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(format!("pilot:{address}"), "data").await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    async fn query_pilots_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Pilot>, LiveStoreError> {
        let members = self.query_radius_members("pilots:geo", center, radius_km).await?;
        self.fetch_hash_data("pilot", &members).await
    }

    async fn query_ground_objects_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<GroundObject>, LiveStoreError> {
        let members = self
            .query_radius_members("ground_objects:geo", center, radius_km)
            .await?;
        self.fetch_hash_data("ground", &members).await
    }

    async fn query_thermals_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Thermal>, LiveStoreError> {
        let members = self.query_radius_members("thermals:geo", center, radius_km).await?;
        self.fetch_hash_data("thermal", &members).await
    }

    async fn query_stations_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Station>, LiveStoreError> {
        let members = self.query_radius_members("stations:geo", center, radius_km).await?;
        self.fetch_hash_data("station", &members).await
    }

    async fn append_track(&self, address: DeviceAddress, point: &TrackPoint) -> Result<(), LiveStoreError> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(point)?;
        let key = format!("track:{address}");
        let _: () = conn.lpush(&key, data).await?;
        let _: () = conn.ltrim(&key, 0, TRACK_MAX_LEN - 1).await?;
        Ok(())
    }

    async fn get_track(&self, address: DeviceAddress) -> Result<Vec<TrackPoint>, LiveStoreError> {
        let mut conn = self.conn.clone();
        let key = format!("track:{address}");
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        let mut points = raw
            .into_iter()
            .map(|s| serde_json::from_str::<TrackPoint>(&s))
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse(); // stored most-recent-at-head; chronological = oldest first
        Ok(points)
    }

    async fn ping(&self) -> Result<(), LiveStoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl RedisLiveStore {
    async fn fetch_hash_data<T: for<'de> serde::Deserialize<'de>>(
        &self,
        prefix: &str,
        members: &[String],
    ) -> Result<Vec<T>, LiveStoreError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            let raw: Option<String> = conn.hget(format!("{prefix}:{member}"), "data").await?;
            if let Some(raw) = raw {
                out.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(out)
    }
}
