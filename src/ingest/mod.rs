//! Ingest supervisor (§4.10): owns the MQTT connection, subscribes on
//! connect and reconnect, and hash-dispatches decoded records to a fixed
//! worker pool so per-device ordering survives concurrent processing.
//!
//! Grounded in the teacher's `aprs_client.rs` reconnect-loop shape, swapped
//! from a hand-rolled TCP/APRS-IS client onto `rumqttc`'s `AsyncClient` +
//! `EventLoop`, which already owns reconnection; the supervisor's job is
//! resubscribing after each reconnect and feeding the worker pool.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch_writer::BatchWriterHandle;
use crate::boundary::BoundaryTracker;
use crate::broadcaster::{Broadcaster, EntityPayload, EntityUpdate, UpdateKind};
use crate::config::Config;
use crate::fanet::codec;
use crate::live_store::LiveStore;
use crate::model::device_address::DeviceAddress;
use crate::model::entities::{EntityRecord, GroundObject, Pilot, Station, Thermal};
use crate::model::kinds::Visibility;
use crate::subscription::SubscriptionIndex;
use crate::validator::Validator;

/// Everything a worker needs to run the decode→validate→live-store→
/// broadcast→batch-writer-enqueue pipeline for one message, shared across
/// the whole worker pool behind `Arc`.
pub struct Pipeline {
    pub topic_prefix: String,
    pub validator: Arc<Validator>,
    pub boundary: Arc<BoundaryTracker>,
    pub live_store: Arc<dyn LiveStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub subscriptions: Arc<SubscriptionIndex>,
    pub pilot_writer: BatchWriterHandle<Pilot>,
    pub thermal_writer: BatchWriterHandle<Thermal>,
    pub station_writer: BatchWriterHandle<Station>,
}

struct RawMessage {
    topic: String,
    payload: Vec<u8>,
}

impl Pipeline {
    /// Runs the full per-message pipeline. Every step isolates its own
    /// failure: a dropped message at any stage never aborts the worker
    /// loop (§4.10).
    async fn process(&self, topic: &str, payload: &[u8]) {
        let record = match codec::decode(topic, payload) {
            Ok(record) => record,
            Err(err) => {
                debug!(topic, error = ?err, "dropping undecodable frame");
                return;
            }
        };

        match record {
            EntityRecord::Pilot {
                address,
                position,
                timestamp,
                aircraft_kind,
                ground_speed_kmh,
                climb_rate_dms,
                heading_deg,
                battery_pct,
                name,
            } => {
                self.process_pilot(
                    address,
                    position,
                    timestamp,
                    aircraft_kind,
                    ground_speed_kmh,
                    climb_rate_dms,
                    heading_deg,
                    battery_pct,
                    name,
                )
                .await
            }
            EntityRecord::GroundObject {
                address,
                position,
                timestamp,
                ground_kind,
                track_online,
            } => {
                let object = GroundObject {
                    address,
                    name: None,
                    ground_kind,
                    position,
                    last_update: timestamp,
                    track_online,
                };
                match self.live_store.upsert_ground_object(&object).await {
                    Ok(true) => {
                        self.broadcast(UpdateKind::Update, EntityPayload::GroundObject(object))
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%address, error = %err, "ground object upsert failed"),
                }
            }
            EntityRecord::Thermal {
                address,
                position,
                timestamp,
                quality,
                climb_dms,
                wind_speed_ms,
                wind_heading_deg,
            } => {
                let thermal = Thermal {
                    id: thermal_id(address, timestamp),
                    reporter_address: address,
                    position,
                    quality,
                    climb_dms,
                    wind_speed_ms,
                    wind_heading_deg,
                    created_at: timestamp,
                };
                match self.live_store.upsert_thermal(&thermal).await {
                    Ok(true) => {
                        self.broadcast(UpdateKind::Add, EntityPayload::Thermal(thermal.clone()));
                        if self.thermal_writer.enqueue(thermal).is_err() {
                            warn!(%address, "thermal batch writer queue full, dropping");
                        }
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%address, error = %err, "thermal upsert failed"),
                }
            }
            EntityRecord::Station {
                address,
                position,
                timestamp,
                temperature_c,
                wind_speed_ms,
                wind_heading_deg,
                wind_gusts_ms,
                humidity_pct,
                pressure_hpa,
                battery_pct,
            } => {
                let station = Station {
                    address,
                    name: None,
                    position,
                    temperature_c,
                    wind_speed_ms,
                    wind_heading_deg,
                    wind_gusts_ms,
                    humidity_pct,
                    pressure_hpa,
                    battery_pct,
                    last_update: timestamp,
                };
                match self.live_store.upsert_station(&station).await {
                    Ok(true) => {
                        self.broadcast(UpdateKind::Update, EntityPayload::Station(station.clone()));
                        if self.station_writer.enqueue(station).is_err() {
                            warn!(%address, "station batch writer queue full, dropping");
                        }
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%address, error = %err, "station upsert failed"),
                }
            }
        }
    }

    /// Runs the decode-less half of the pilot pipeline (validate, boundary
    /// classify, upsert, broadcast, persist) directly from already-parsed
    /// fields. Shared by the MQTT ingest path and `POST /api/v1/position`
    /// (§6), which feeds the same pipeline from an authenticated HTTP body
    /// instead of a decoded FANET frame. Returns the committed pilot, or
    /// `None` if the observation was rejected or dropped at any stage.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn process_pilot(
        &self,
        address: DeviceAddress,
        position: Option<crate::model::geo::GeoPoint>,
        timestamp: chrono::DateTime<chrono::Utc>,
        aircraft_kind: crate::model::kinds::AircraftKind,
        ground_speed_kmh: Option<f64>,
        climb_rate_dms: Option<i16>,
        heading_deg: Option<u16>,
        battery_pct: Option<u8>,
        name: Option<String>,
    ) -> Option<Pilot> {
        let outcome = self
            .validator
            .observe(address, position, timestamp, aircraft_kind);
        if !outcome.valid {
            return None;
        }

        let Some(position) = position else {
            // A validated name-only packet: merge the name into the live
            // record if one already exists, but there is nothing to
            // boundary-classify or persist.
            return None;
        };

        let prior = self.live_store.get_pilot(address).await.ok().flatten();

        let boundary = self.boundary.observe(
            &position,
            timestamp,
            prior.as_ref().map(|p| &p.position),
            prior.as_ref().map(|p| p.last_movement),
        );
        if !boundary.in_monitoring_zone {
            return None;
        }

        let pilot = Pilot {
            address,
            name: name.or_else(|| prior.as_ref().and_then(|p| p.name.clone())),
            aircraft_kind,
            position,
            ground_speed_kmh: ground_speed_kmh.unwrap_or(0.0),
            climb_rate_dms: climb_rate_dms.unwrap_or(0),
            heading_deg: heading_deg.unwrap_or(0),
            battery_pct: battery_pct.unwrap_or(0),
            track_online: true,
            last_update: timestamp,
            last_movement: boundary.last_movement,
            distance_from_center_m: boundary.distance_m,
            visibility: boundary.visibility,
        };

        match self.live_store.upsert_pilot(&pilot).await {
            Ok(true) => {
                if pilot.visibility != Visibility::Outside {
                    self.broadcast(UpdateKind::Update, EntityPayload::Pilot(pilot.clone()));
                }
                let point = crate::model::entities::TrackPoint::raw(pilot.position, timestamp);
                if let Err(err) = self.live_store.append_track(address, &point).await {
                    warn!(%address, error = %err, "track append failed");
                }
                if self.pilot_writer.enqueue(pilot.clone()).is_err() {
                    warn!(%address, "pilot batch writer queue full, dropping");
                }
                Some(pilot)
            }
            Ok(false) => None,
            Err(err) => {
                warn!(%address, error = %err, "pilot upsert failed");
                None
            }
        }
    }

    fn broadcast(&self, kind: UpdateKind, entity: EntityPayload) {
        let sequence = self.broadcaster.next_sequence();
        let update = EntityUpdate {
            kind,
            entity,
            sequence,
        };
        let frame = Arc::new(crate::ws::encode_frame(crate::ws::FrameTag::EntityUpdate, &update));
        self.broadcaster.publish(update, &self.subscriptions, frame);
    }
}

/// Derives a stable thermal id from the reporting device and a coarse
/// time bucket, since the wire format carries no explicit thermal id and
/// §3 only requires monotonicity per reporting session.
fn thermal_id(reporter: DeviceAddress, timestamp: chrono::DateTime<chrono::Utc>) -> u64 {
    ((reporter.as_u32() as u64) << 32) | (timestamp.timestamp() as u64 & 0xFFFF_FFFF)
}

fn parse_mqtt_url(url: &str) -> (String, u16) {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    match without_scheme.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(1883)),
        None => (without_scheme.to_string(), 1883),
    }
}

/// Owns the MQTT connection and the worker pool. `run` drives both until
/// `cancel` fires.
pub struct IngestSupervisor {
    pipeline: Arc<Pipeline>,
    config: Config,
}

impl IngestSupervisor {
    pub fn new(pipeline: Arc<Pipeline>, config: Config) -> Self {
        Self { pipeline, config }
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let (host, port) = parse_mqtt_url(&self.config.mqtt_url);
        let mut options = MqttOptions::new(self.config.mqtt_client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(self.config.mqtt_clean_session);

        let (client, mut eventloop) = AsyncClient::new(options, 256);
        let topic = format!("{}/+/f/#", self.config.mqtt_topic_prefix);

        let workers = spawn_workers(self.pipeline.clone(), self.config.worker_pool_size, &cancel);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("ingest supervisor shutting down");
                    break;
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(%topic, "mqtt connected, subscribing");
                            if let Err(err) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                                error!(error = %err, "mqtt subscribe failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            dispatch(&workers, RawMessage {
                                topic: publish.topic,
                                payload: publish.payload.to_vec(),
                            });
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "mqtt connection error, reconnecting");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn spawn_workers(
    pipeline: Arc<Pipeline>,
    pool_size: usize,
    cancel: &CancellationToken,
) -> Vec<mpsc::Sender<RawMessage>> {
    let pool_size = pool_size.max(1);
    let mut senders = Vec::with_capacity(pool_size);
    for worker_id in 0..pool_size {
        let (sender, mut receiver) = mpsc::channel::<RawMessage>(1024);
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    message = receiver.recv() => {
                        match message {
                            Some(message) => {
                                pipeline.process(&message.topic, &message.payload).await;
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!(worker_id, "ingest worker stopped");
        });
        senders.push(sender);
    }
    senders
}

/// Hashes by the 24-bit FANET source address carried in the payload
/// (`codec::peek_source_address`, not the topic's gateway chip_id) so every
/// packet from a given device lands on the same worker, preserving
/// per-device ordering per §5/§9. The topic only identifies the gateway
/// that heard the frame, not the device that sent it, and a device heard by
/// more than one gateway would otherwise split across workers. Falls back
/// to hashing the raw topic for frames too short to carry an address (the
/// decode on the worker will reject them as `ShortFrame`).
fn dispatch(workers: &[mpsc::Sender<RawMessage>], message: RawMessage) {
    let hash = match codec::peek_source_address(&message.payload) {
        Some(address) => address.as_u32() as u64,
        None => message
            .topic
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64)),
    };
    let worker = (hash as usize) % workers.len();
    if workers[worker].try_send(message).is_err() {
        metrics::counter!("ingest_worker_queue_full_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_host_and_port() {
        assert_eq!(
            parse_mqtt_url("mqtt://broker.example:1883"),
            ("broker.example".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("broker.example"),
            ("broker.example".to_string(), 1883)
        );
    }

    #[test]
    fn thermal_ids_are_stable_for_same_device_and_second() {
        let addr = DeviceAddress::new(42).unwrap();
        let ts = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(thermal_id(addr, ts), thermal_id(addr, ts));
    }

    #[test]
    fn dispatch_falls_back_to_topic_hash_for_short_payloads() {
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let workers = vec![tx1, tx2];
        dispatch(&workers, RawMessage { topic: "fb/b/abc123/f/1".into(), payload: vec![] });
        dispatch(&workers, RawMessage { topic: "fb/b/abc123/f/1".into(), payload: vec![] });
        let first = rx1.try_recv().is_ok() || rx2.try_recv().is_ok();
        assert!(first);
    }

    fn thermal_payload(address: u32) -> Vec<u8> {
        let record = EntityRecord::Thermal {
            address: DeviceAddress::new(address).unwrap(),
            position: crate::model::geo::GeoPoint::new(46.0, 8.0),
            timestamp: chrono::Utc::now(),
            quality: 3,
            climb_dms: 20,
            wind_speed_ms: 2.0,
            wind_heading_deg: 90,
        };
        let (_topic, payload) = codec::encode(&record, "fb/b", chrono::Utc::now(), -80, 5);
        payload
    }

    #[test]
    fn dispatch_spreads_distinct_device_addresses_across_workers() {
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let (tx3, mut rx3) = mpsc::channel(8);
        let workers = vec![tx1, tx2, tx3];

        // Same gateway chip_id in the topic for every message: only the
        // address embedded in the payload may determine the worker.
        for address in [1u32, 2, 3, 4, 5, 6, 7, 8] {
            let payload = thermal_payload(address);
            dispatch(
                &workers,
                RawMessage { topic: "fb/b/samegateway/f/7".into(), payload },
            );
        }

        let hits = [rx1.len(), rx2.len(), rx3.len()];
        assert!(
            hits.iter().filter(|&&n| n > 0).count() > 1,
            "messages from distinct device addresses collapsed onto a single worker: {hits:?}"
        );
    }

    #[test]
    fn dispatch_is_stable_for_same_device_address() {
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let workers = vec![tx1, tx2];

        let payload_a = thermal_payload(0xABC123);
        let payload_b = thermal_payload(0xABC123);
        dispatch(
            &workers,
            RawMessage { topic: "fb/b/gatewayone/f/7".into(), payload: payload_a },
        );
        dispatch(
            &workers,
            // Different topic (as if heard by a second gateway): must still
            // land on the same worker because the address is unchanged.
            RawMessage { topic: "fb/b/gatewaytwo/f/7".into(), payload: payload_b },
        );

        let landed_on_one = (rx1.len() == 2 && rx2.len() == 0) || (rx1.len() == 0 && rx2.len() == 2);
        assert!(landed_on_one, "same device address must dispatch to the same worker");
    }
}
