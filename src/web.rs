//! HTTP surface (§6). Replaces the teacher's Postgres/NATS `/data/*` glider
//! API with the `/api/v1/*` FANET surface; keeps the teacher's axum
//! `Router` + `AppState` + `tower-http` layering shape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use prost::Message as _;
use serde::Deserialize;
use serde_json::json;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::{KeyExtractor, PeerIpKeyExtractor};
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthenticatedDevice;
use crate::config::Config;
use crate::db::MysqlPool;
use crate::error::{HttpError, HttpResult};
use crate::filters::{self, FilterLevel};
use crate::geo::math::haversine_distance_m;
use crate::ingest::Pipeline;
use crate::model::device_address::DeviceAddress;
use crate::model::entities::{GroundObject, Pilot, Station, Thermal};
use crate::model::geo::GeoPoint;
use crate::model::kinds::AircraftKind;
use crate::model::validation::ValidationState;
use crate::snapshot::{SnapshotComposer, SnapshotError};
use crate::validator::ValidatorSummary;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub snapshot_composer: Arc<SnapshotComposer>,
    pub mysql_pool: MysqlPool,
    pub http_client: reqwest::Client,
    pub auth_cache: moka::future::Cache<String, DeviceAddress>,
    pub metrics_handle: PrometheusHandle,
    pub ready: Arc<AtomicBool>,
}

/// Rate-limits `POST /position` per bearer token rather than per IP, since
/// the spec's "1 req/s/device" only makes sense keyed on device identity
/// (§6); falls back to the peer IP for unauthenticated requests so the
/// limiter still has a key to bucket on before the handler runs auth.
#[derive(Clone, Debug)]
struct BearerOrIpKeyExtractor;

impl KeyExtractor for BearerOrIpKeyExtractor {
    type Key = String;

    fn extract<B>(&self, req: &axum::http::Request<B>) -> Result<Self::Key, GovernorError> {
        if let Some(token) = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            return Ok(format!("token:{token}"));
        }
        PeerIpKeyExtractor.extract(req).map(|ip| format!("ip:{ip}"))
    }

    fn name(&self) -> &'static str {
        "bearer-or-ip"
    }
}

pub fn router(state: AppState) -> Router {
    let global_governor = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(100)
            .burst_size(200)
            .finish()
            .expect("valid governor config"),
    ));

    let position_governor = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .key_extractor(BearerOrIpKeyExtractor)
            .per_second(1)
            .burst_size(1)
            .finish()
            .expect("valid governor config"),
    ));

    let position_routes = Router::new()
        .route("/position", post(post_position))
        .layer(GovernorLayer {
            config: position_governor,
        });

    let api = Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/pilots", get(get_pilots))
        .route("/thermals", get(get_thermals))
        .route("/stations", get(get_stations))
        .route("/track/{addr}", get(get_track))
        .route("/validation/metrics", get(get_validation_metrics))
        .route("/validation/{addr}", get(get_validation_device))
        .route("/invalidate/{addr}", post(post_invalidate))
        .route("/health", get(get_health))
        .route("/ready", get(get_ready))
        .route("/metrics", get(get_metrics))
        .merge(position_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/ws/v1/updates", get(crate::ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(GovernorLayer {
            config: global_governor,
        })
        .with_state(state)
}

fn wants_protobuf(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/x-protobuf"))
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
}

async fn get_snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotQuery>,
    headers: HeaderMap,
) -> HttpResult<Response> {
    let radius_km = params.radius.unwrap_or(state.config.default_radius_km);
    let sequence = state.pipeline.broadcaster.current_sequence();
    let snapshot = state
        .snapshot_composer
        .compose(GeoPoint::new(params.lat, params.lon), radius_km, sequence)
        .await
        .map_err(|err| match err {
            SnapshotError::RadiusTooLarge(r) => {
                HttpError::BadRequest(format!("radius {r}km exceeds the configured maximum"))
            }
            SnapshotError::LiveStore(e) => HttpError::Unavailable(e.to_string()),
        })?;

    if wants_protobuf(&headers) {
        let proto = proto_codec::snapshot_to_proto(&snapshot);
        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto
            .encode(&mut buf)
            .map_err(|err| HttpError::Internal(err.into()))?;
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-protobuf")],
            buf,
        )
            .into_response())
    } else {
        Ok(Json(snapshot).into_response())
    }
}

/// A rectangular viewport, the query shape `GET /pilots|thermals|stations`
/// accept (§6). [`crate::live_store::LiveStore`] only speaks radius
/// queries, so a bounds request queries the store with the smallest
/// enclosing circle and re-filters to the exact rectangle here.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    sw_lat: f64,
    sw_lon: f64,
    ne_lat: f64,
    ne_lon: f64,
}

impl Bounds {
    fn parse(raw: &str) -> HttpResult<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| HttpError::BadRequest("bounds must be 4 comma-separated numbers".into()))?;
        let [sw_lat, sw_lon, ne_lat, ne_lon]: [f64; 4] = parts
            .try_into()
            .map_err(|_| HttpError::BadRequest("bounds requires exactly sw_lat,sw_lon,ne_lat,ne_lon".into()))?;
        Ok(Self { sw_lat, sw_lon, ne_lat, ne_lon })
    }

    fn center(&self) -> GeoPoint {
        GeoPoint::new((self.sw_lat + self.ne_lat) / 2.0, (self.sw_lon + self.ne_lon) / 2.0)
    }

    fn enclosing_radius_km(&self) -> f64 {
        let center = self.center();
        let corner = GeoPoint::new(self.ne_lat, self.ne_lon);
        haversine_distance_m(&center, &corner) / 1000.0 + 0.01
    }

    fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.sw_lat
            && point.latitude <= self.ne_lat
            && point.longitude >= self.sw_lon
            && point.longitude <= self.ne_lon
    }
}

#[derive(Debug, Deserialize)]
struct BoundsQuery {
    bounds: String,
}

async fn get_pilots(
    State(state): State<AppState>,
    Query(query): Query<BoundsQuery>,
) -> HttpResult<Json<Vec<Pilot>>> {
    let bounds = Bounds::parse(&query.bounds)?;
    let pilots = state
        .pipeline
        .live_store
        .query_pilots_radius(&bounds.center(), bounds.enclosing_radius_km())
        .await
        .map_err(|err| HttpError::Unavailable(err.to_string()))?;
    Ok(Json(
        pilots.into_iter().filter(|p| bounds.contains(&p.position)).collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct ThermalsQuery {
    bounds: String,
    min_quality: Option<u8>,
}

async fn get_thermals(
    State(state): State<AppState>,
    Query(query): Query<ThermalsQuery>,
) -> HttpResult<Json<Vec<Thermal>>> {
    let bounds = Bounds::parse(&query.bounds)?;
    let min_quality = query.min_quality.unwrap_or(0);
    let thermals = state
        .pipeline
        .live_store
        .query_thermals_radius(&bounds.center(), bounds.enclosing_radius_km())
        .await
        .map_err(|err| HttpError::Unavailable(err.to_string()))?;
    Ok(Json(
        thermals
            .into_iter()
            .filter(|t| bounds.contains(&t.position) && t.quality >= min_quality)
            .collect(),
    ))
}

async fn get_stations(
    State(state): State<AppState>,
    Query(query): Query<BoundsQuery>,
) -> HttpResult<Json<Vec<Station>>> {
    let bounds = Bounds::parse(&query.bounds)?;
    let stations = state
        .pipeline
        .live_store
        .query_stations_radius(&bounds.center(), bounds.enclosing_radius_km())
        .await
        .map_err(|err| HttpError::Unavailable(err.to_string()))?;
    Ok(Json(
        stations.into_iter().filter(|s| bounds.contains(&s.position)).collect(),
    ))
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum TrackFormat {
    #[default]
    Json,
    Geojson,
}

#[derive(Debug, Deserialize)]
struct TrackQuery {
    #[serde(default)]
    level: u8,
    #[serde(default)]
    format: TrackFormat,
}

/// The track filter engine reads from the persistent store, not the live
/// store's 1000-point cap, per §9 ("the filter engine reads from the
/// persistent store, which may hold more"). Falls back to the live store's
/// track list when the relational history is empty, which is the case for
/// a device still waiting on its first batch-writer flush (§4.5).
async fn fetch_track_for_filtering(
    state: &AppState,
    address: DeviceAddress,
) -> HttpResult<Vec<crate::model::entities::TrackPoint>> {
    let pool = state.mysql_pool.clone();
    let raw_address = address.as_u32();
    let history = tokio::task::spawn_blocking(move || {
        pool.get()
            .map_err(anyhow::Error::from)
            .and_then(|mut conn| crate::db::repo::select_pilot_track(&mut conn, raw_address).map_err(anyhow::Error::from))
    })
    .await
    .map_err(|err| HttpError::Internal(err.into()))?
    .map_err(HttpError::Internal)?;

    if !history.is_empty() {
        return Ok(history);
    }

    state
        .pipeline
        .live_store
        .get_track(address)
        .await
        .map_err(|err| HttpError::Unavailable(err.to_string()))
}

async fn get_track(
    State(state): State<AppState>,
    Path(address): Path<DeviceAddress>,
    Query(query): Query<TrackQuery>,
) -> HttpResult<Response> {
    let points = fetch_track_for_filtering(&state, address).await?;
    let filtered = filters::filter_track(points, FilterLevel::from_query(query.level));

    Ok(match query.format {
        TrackFormat::Json => Json(filtered).into_response(),
        TrackFormat::Geojson => Json(track_to_geojson(&filtered)).into_response(),
    })
}

fn track_to_geojson(filtered: &filters::FilteredTrack) -> serde_json::Value {
    let coordinates: Vec<[f64; 2]> = filtered
        .points
        .iter()
        .filter(|p| !p.filtered)
        .map(|p| [p.position.longitude, p.position.latitude])
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": coordinates },
            "properties": {
                "original_count": filtered.original_count,
                "filtered_count": filtered.filtered_count,
                "statistics": filtered.statistics,
                "segments": filtered.segments,
            },
        }],
    })
}

#[derive(Debug, Deserialize)]
struct PositionRequest {
    lat: f64,
    lon: f64,
    altitude_m: Option<i16>,
    aircraft_kind: Option<AircraftKind>,
    ground_speed_kmh: Option<f64>,
    climb_rate_dms: Option<i16>,
    heading_deg: Option<u16>,
    battery_pct: Option<u8>,
    name: Option<String>,
}

async fn post_position(
    State(state): State<AppState>,
    AuthenticatedDevice { address }: AuthenticatedDevice,
    Json(body): Json<PositionRequest>,
) -> HttpResult<Json<Pilot>> {
    let position = GeoPoint {
        latitude: body.lat,
        longitude: body.lon,
        altitude_m: body.altitude_m,
    };
    if !position.in_range() {
        return Err(HttpError::BadRequest("lat/lon out of range".into()));
    }

    state
        .pipeline
        .process_pilot(
            address,
            Some(position),
            Utc::now(),
            body.aircraft_kind.unwrap_or(AircraftKind::Unknown),
            body.ground_speed_kmh,
            body.climb_rate_dms,
            body.heading_deg,
            body.battery_pct,
            body.name,
        )
        .await
        .map(Json)
        .ok_or_else(|| HttpError::BadRequest("position rejected by validator or boundary tracker".into()))
}

async fn get_validation_metrics(State(state): State<AppState>) -> Json<ValidatorSummary> {
    Json(state.pipeline.validator.summary())
}

async fn get_validation_device(
    State(state): State<AppState>,
    Path(address): Path<DeviceAddress>,
) -> HttpResult<Json<ValidationState>> {
    state
        .pipeline
        .validator
        .state(address)
        .map(Json)
        .ok_or_else(|| HttpError::NotFound(format!("no validator state for {address}")))
}

async fn post_invalidate(
    State(state): State<AppState>,
    Path(address): Path<DeviceAddress>,
) -> HttpResult<StatusCode> {
    if state.pipeline.validator.invalidate(address) {
        Ok(StatusCode::OK)
    } else {
        Err(HttpError::NotFound(format!("no validator state for {address}")))
    }
}

async fn get_health() -> StatusCode {
    StatusCode::OK
}

async fn get_ready(State(state): State<AppState>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}

/// Conversions from the live domain model to the wire-compatible protobuf
/// schema in `proto/snapshot.proto`, used only when a client negotiates
/// `Accept: application/x-protobuf` on the snapshot endpoint (§6).
mod proto_codec {
    use super::*;
    use crate::proto;
    use crate::snapshot::Snapshot;

    fn geo_point(p: &GeoPoint) -> proto::GeoPoint {
        proto::GeoPoint {
            latitude: p.latitude,
            longitude: p.longitude,
            altitude_m: p.altitude_m.unwrap_or(0) as i32,
        }
    }

    fn pilot(p: &Pilot) -> proto::Pilot {
        proto::Pilot {
            address: p.address.as_u32(),
            name: p.name.clone().unwrap_or_default(),
            aircraft_kind: p.aircraft_kind as u32,
            position: Some(geo_point(&p.position)),
            ground_speed_kmh: p.ground_speed_kmh,
            climb_rate_dms: p.climb_rate_dms as i32,
            heading_deg: p.heading_deg as u32,
            battery_pct: p.battery_pct as u32,
            track_online: p.track_online,
            last_update_unix_ms: p.last_update.timestamp_millis(),
            visibility: format!("{:?}", p.visibility).to_lowercase(),
        }
    }

    fn ground_object(o: &GroundObject) -> proto::GroundObject {
        proto::GroundObject {
            address: o.address.as_u32(),
            name: o.name.clone().unwrap_or_default(),
            ground_kind: o.ground_kind as u32,
            position: Some(geo_point(&o.position)),
            last_update_unix_ms: o.last_update.timestamp_millis(),
            track_online: o.track_online,
        }
    }

    fn thermal(t: &Thermal) -> proto::Thermal {
        proto::Thermal {
            id: t.id,
            reporter_address: t.reporter_address.as_u32(),
            position: Some(geo_point(&t.position)),
            quality: t.quality as u32,
            climb_dms: t.climb_dms as i32,
            wind_speed_ms: t.wind_speed_ms,
            wind_heading_deg: t.wind_heading_deg as u32,
            created_unix_ms: t.created_at.timestamp_millis(),
        }
    }

    fn station(s: &Station) -> proto::Station {
        proto::Station {
            address: s.address.as_u32(),
            name: s.name.clone().unwrap_or_default(),
            position: Some(geo_point(&s.position)),
            temperature_c: s.temperature_c,
            wind_speed_ms: s.wind_speed_ms,
            wind_heading_deg: s.wind_heading_deg as u32,
            wind_gusts_ms: s.wind_gusts_ms,
            humidity_pct: s.humidity_pct as u32,
            pressure_hpa: s.pressure_hpa,
            battery_pct: s.battery_pct as u32,
            last_update_unix_ms: s.last_update.timestamp_millis(),
        }
    }

    pub fn snapshot_to_proto(snapshot: &Snapshot) -> proto::Snapshot {
        proto::Snapshot {
            pilots: snapshot.pilots.iter().map(pilot).collect(),
            ground_objects: snapshot.ground_objects.iter().map(ground_object).collect(),
            thermals: snapshot.thermals.iter().map(thermal).collect(),
            stations: snapshot.stations.iter().map(station).collect(),
            sequence: snapshot.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_parses_four_values() {
        let bounds = Bounds::parse("46.0,8.0,47.0,9.0").unwrap();
        assert_eq!(bounds.sw_lat, 46.0);
        assert_eq!(bounds.ne_lon, 9.0);
    }

    #[test]
    fn bounds_rejects_wrong_arity() {
        assert!(Bounds::parse("46.0,8.0,47.0").is_err());
    }

    #[test]
    fn bounds_contains_is_inclusive() {
        let bounds = Bounds::parse("46.0,8.0,47.0,9.0").unwrap();
        assert!(bounds.contains(&GeoPoint::new(46.5, 8.5)));
        assert!(!bounds.contains(&GeoPoint::new(48.0, 8.5)));
    }
}
