//! Differential update fan-out (§4.8). Serializes each committed entity
//! update once, then pushes it to every subscriber whose precise radius
//! includes the position, dropping for any client whose channel is full
//! rather than blocking the hot path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::model::entities::{GroundObject, Pilot, Station, Thermal};
use crate::model::geo::GeoPoint;
use crate::subscription::SubscriptionIndex;

pub const CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateKind {
    Add,
    Update,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityPayload {
    Pilot(Pilot),
    GroundObject(GroundObject),
    Thermal(Thermal),
    Station(Station),
}

impl EntityPayload {
    pub fn position(&self) -> GeoPoint {
        match self {
            Self::Pilot(p) => p.position,
            Self::GroundObject(o) => o.position,
            Self::Thermal(t) => t.position,
            Self::Station(s) => s.position,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityUpdate {
    pub kind: UpdateKind,
    pub entity: EntityPayload,
    pub sequence: u64,
}

/// A outbound frame ready to push over the client's WebSocket. Carried as
/// pre-serialized bytes so the broadcaster only serializes once per
/// update, not once per subscriber.
pub type OutboundFrame = Arc<Vec<u8>>;

pub struct Broadcaster {
    clients: DashMap<Uuid, mpsc::Sender<OutboundFrame>>,
    sequence: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn register_client(&self, client: Uuid) -> mpsc::Receiver<OutboundFrame> {
        let (sender, receiver) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        self.clients.insert(client, sender);
        receiver
    }

    pub fn unregister_client(&self, client: &Uuid) {
        self.clients.remove(client);
    }

    /// Encodes `update` once (tag byte + JSON body, see `ws` module for
    /// frame shape) and fans it out to every subscriber of `index` whose
    /// precise radius covers the entity's position.
    pub fn publish(&self, update: EntityUpdate, index: &SubscriptionIndex, frame: OutboundFrame) {
        let position = update.entity.position();
        for client in index.subscribers_for(&position) {
            if let Some(sender) = self.clients.get(&client) {
                if sender.try_send(frame.clone()).is_err() {
                    metrics::counter!("websocket_drop_total").increment(1);
                }
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device_address::DeviceAddress;
    use crate::model::kinds::{AircraftKind, Visibility};
    use chrono::Utc;

    fn pilot_update(sequence: u64) -> EntityUpdate {
        let now = Utc::now();
        EntityUpdate {
            kind: UpdateKind::Update,
            entity: EntityPayload::Pilot(Pilot {
                address: DeviceAddress::new(1).unwrap(),
                name: None,
                aircraft_kind: AircraftKind::Paraglider,
                position: GeoPoint::new(46.5, 14.2),
                ground_speed_kmh: 20.0,
                climb_rate_dms: 0,
                heading_deg: 0,
                battery_pct: 90,
                track_online: true,
                last_update: now,
                last_movement: now,
                distance_from_center_m: 0.0,
                visibility: Visibility::Visible,
            }),
            sequence,
        }
    }

    #[tokio::test]
    async fn subscriber_in_range_receives_update() {
        let broadcaster = Broadcaster::new();
        let index = SubscriptionIndex::new(5);
        let client = Uuid::new_v4();
        let mut receiver = broadcaster.register_client(client);
        index.register(client, GeoPoint::new(46.5, 14.2), 10.0);

        broadcaster.publish(pilot_update(1), &index, Arc::new(vec![1, 2, 3]));
        let frame = receiver.try_recv().unwrap();
        assert_eq!(*frame, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn full_channel_drops_and_counts() {
        let broadcaster = Broadcaster::new();
        let index = SubscriptionIndex::new(5);
        let client = Uuid::new_v4();
        let _receiver = broadcaster.register_client(client); // never drained
        index.register(client, GeoPoint::new(46.5, 14.2), 10.0);

        for i in 0..(CLIENT_CHANNEL_CAPACITY + 5) {
            broadcaster.publish(pilot_update(i as u64), &index, Arc::new(vec![0u8]));
        }
        // No panic, no blocking: excess sends silently dropped per client policy.
    }
}
