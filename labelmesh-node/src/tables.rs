//! The soft-state tables (spec.md §4.D–4.F): peers, routes, interests,
//! content. Pure data structures — timer scheduling around them is the
//! caller's job (see `NodeState` in [`crate::node`]), so these are easy
//! to unit test without spinning up any async runtime machinery beyond
//! the timer handles they own.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::model::{AdvertRecord, ContentRecord, InterestRecord, PeerRecord, RouteEntry};

#[derive(Default)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, PeerRecord>,
}

impl PeerTable {
    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    /// Replace whatever is stored for `addr`, cancelling the old timer
    /// if one was present.
    pub fn insert(&mut self, addr: SocketAddr, record: PeerRecord) {
        if let Some(old) = self.peers.insert(addr, record) {
            old.timer.cancel();
        }
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<PeerRecord> {
        self.peers.remove(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn get(&self, client: &str) -> Option<&Vec<RouteEntry>> {
        self.routes.get(client)
    }

    /// Insert or update the `(addr, score)` entry for `client`, keeping
    /// the invariants in spec.md §3: at most one entry per next-hop,
    /// sorted by score descending.
    pub fn upsert(&mut self, client: &str, addr: SocketAddr, score: f64) {
        let entries = self.routes.entry(client.to_string()).or_default();
        match entries.iter_mut().find(|e| e.addr == addr) {
            Some(e) => e.score = score,
            None => entries.push(RouteEntry { addr, score }),
        }
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    /// Remove every next-hop matching `addr`, across all clients (peer
    /// expiry, spec.md §4.D).
    pub fn prune_peer(&mut self, addr: &SocketAddr) {
        for entries in self.routes.values_mut() {
            entries.retain(|e| &e.addr != addr);
        }
    }

    /// Clear the routes list for a client whose advert expired.
    pub fn remove_client(&mut self, client: &str) {
        self.routes.remove(client);
    }

    #[cfg(test)]
    pub fn is_sorted_and_unique(&self, client: &str) -> bool {
        let Some(entries) = self.routes.get(client) else {
            return true;
        };
        let sorted = entries.windows(2).all(|w| w[0].score >= w[1].score);
        let mut seen = HashSet::new();
        let unique = entries.iter().all(|e| seen.insert(e.addr));
        sorted && unique
    }
}

#[derive(Default)]
pub struct AdvertStore {
    clients: HashMap<String, AdvertRecord>,
}

impl AdvertStore {
    pub fn get(&self, client: &str) -> Option<&AdvertRecord> {
        self.clients.get(client)
    }

    pub fn insert(&mut self, client: String, record: AdvertRecord) {
        if let Some(old) = self.clients.insert(client, record) {
            old.timer.cancel();
        }
    }

    pub fn remove(&mut self, client: &str) -> Option<AdvertRecord> {
        self.clients.remove(client)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AdvertRecord)> {
        self.clients.iter()
    }
}

#[derive(Default)]
pub struct InterestStore {
    /// label -> client -> entry.
    labels: HashMap<String, HashMap<String, InterestRecord>>,
}

impl InterestStore {
    pub fn get(&self, label: &str, client: &str) -> Option<&InterestRecord> {
        self.labels.get(label)?.get(client)
    }

    pub fn clients_for_label(&self, label: &str) -> Option<&HashMap<String, InterestRecord>> {
        self.labels.get(label)
    }

    pub fn insert(&mut self, label: String, client: String, record: InterestRecord) {
        if let Some(old) = self
            .labels
            .entry(label)
            .or_default()
            .insert(client, record)
        {
            old.timer.cancel();
        }
    }

    /// Remove one interest; drops the label bucket entirely if it's now
    /// empty (spec.md §3 "empty label buckets disappear").
    pub fn remove(&mut self, label: &str, client: &str) -> Option<InterestRecord> {
        let bucket = self.labels.get_mut(label)?;
        let removed = bucket.remove(client);
        if bucket.is_empty() {
            self.labels.remove(label);
        }
        removed
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

#[derive(Default)]
pub struct ContentStore {
    entries: HashMap<String, ContentRecord>,
}

impl ContentStore {
    pub fn get(&self, label: &str) -> Option<&ContentRecord> {
        self.entries.get(label)
    }

    pub fn entry_or_empty(&mut self, label: &str) -> &mut ContentRecord {
        self.entries
            .entry(label.to_string())
            .or_insert_with(ContentRecord::empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn route_table_sorts_descending_and_dedups_next_hop() {
        let mut rt = RouteTable::default();
        rt.upsert("alice", addr(1), 10.0);
        rt.upsert("alice", addr(2), 50.0);
        rt.upsert("alice", addr(1), 30.0); // update, not a new entry
        let entries = rt.get("alice").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].addr, addr(2));
        assert_eq!(entries[1].addr, addr(1));
        assert_eq!(entries[1].score, 30.0);
        assert!(rt.is_sorted_and_unique("alice"));
    }

    #[test]
    fn prune_peer_removes_matching_next_hops_everywhere() {
        let mut rt = RouteTable::default();
        rt.upsert("alice", addr(1), 10.0);
        rt.upsert("bob", addr(1), 20.0);
        rt.upsert("bob", addr(2), 5.0);
        rt.prune_peer(&addr(1));
        assert!(rt.get("alice").unwrap().is_empty());
        assert_eq!(rt.get("bob").unwrap().len(), 1);
        assert_eq!(rt.get("bob").unwrap()[0].addr, addr(2));
    }

    #[test]
    fn interest_store_drops_empty_label_bucket() {
        let mut store = InterestStore::default();
        let timer = labelmesh_core::TimerService::new().schedule(
            std::sync::Arc::new(labelmesh_core::SystemClock),
            0.0,
            async {},
        );
        store.insert(
            "weather".into(),
            "bob".into(),
            InterestRecord {
                after: 0.0,
                ttp: 1.0,
                eol: 10.0,
                timer,
            },
        );
        assert_eq!(store.label_count(), 1);
        store.remove("weather", "bob");
        assert_eq!(store.label_count(), 0);
    }
}
