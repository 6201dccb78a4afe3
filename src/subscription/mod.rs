//! Subscription index (§4.7): a geohash-keyed registry of connected
//! WebSocket clients, used by the broadcaster to find who might care
//! about a given entity update without scanning every client.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use uuid::Uuid;

use crate::geo::{geohash, math::haversine_distance_m};
use crate::model::geo::GeoPoint;

#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    pub center: GeoPoint,
    pub radius_km: f64,
}

pub struct SubscriptionIndex {
    precision: usize,
    // geohash cell -> client ids registered against it
    cells: RwLock<HashMap<String, HashSet<Uuid>>>,
    // client id -> (subscription, cells it's registered under)
    clients: RwLock<HashMap<Uuid, (Subscription, Vec<String>)>>,
}

impl SubscriptionIndex {
    pub fn new(precision: usize) -> Self {
        Self {
            precision,
            cells: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, client: Uuid, center: GeoPoint, radius_km: f64) -> Vec<String> {
        self.unregister(client);

        let covering = geohash::covering(&center, radius_km, self.precision);
        {
            let mut cells = self.cells.write().unwrap();
            for cell in &covering {
                cells.entry(cell.clone()).or_default().insert(client);
            }
        }
        self.clients.write().unwrap().insert(
            client,
            (Subscription { center, radius_km }, covering.clone()),
        );
        covering
    }

    pub fn unregister(&self, client: Uuid) {
        if let Some((_, cells)) = self.clients.write().unwrap().remove(&client) {
            let mut cell_map = self.cells.write().unwrap();
            for cell in cells {
                if let Some(set) = cell_map.get_mut(&cell) {
                    set.remove(&client);
                    if set.is_empty() {
                        cell_map.remove(&cell);
                    }
                }
            }
        }
    }

    /// Clients whose registered cell covers `point`, re-checked against
    /// each client's precise radius before being returned.
    pub fn subscribers_for(&self, point: &GeoPoint) -> Vec<Uuid> {
        let cell = geohash::encode(point, self.precision);
        let candidates: Vec<Uuid> = self
            .cells
            .read()
            .unwrap()
            .get(&cell)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let clients = self.clients.read().unwrap();
        candidates
            .into_iter()
            .filter(|client| {
                clients
                    .get(client)
                    .map(|(sub, _)| {
                        haversine_distance_m(&sub.center, point) <= sub.radius_km * 1000.0
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_client_receives_nearby_updates() {
        let index = SubscriptionIndex::new(5);
        let client = Uuid::new_v4();
        let center = GeoPoint::new(46.5, 14.2);
        index.register(client, center, 20.0);

        let nearby = GeoPoint::new(46.51, 14.21);
        assert!(index.subscribers_for(&nearby).contains(&client));
    }

    #[test]
    fn precise_radius_excludes_far_point_even_if_cell_matches() {
        let index = SubscriptionIndex::new(5);
        let client = Uuid::new_v4();
        let center = GeoPoint::new(46.5, 14.2);
        index.register(client, center, 1.0);

        let far = GeoPoint::new(47.0, 14.2);
        assert!(!index.subscribers_for(&far).contains(&client));
    }

    #[test]
    fn unregister_removes_client_from_all_cells() {
        let index = SubscriptionIndex::new(5);
        let client = Uuid::new_v4();
        let center = GeoPoint::new(46.5, 14.2);
        index.register(client, center, 20.0);
        index.unregister(client);
        assert!(index.is_empty());
        assert!(!index.subscribers_for(&center).contains(&client));
    }
}
