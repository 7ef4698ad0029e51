//! Node-internal data model (spec.md §3). These are the typed records
//! the tables in [`crate::tables`] store; wire items in
//! `labelmesh_core::wire::Item` are the serialized form of the same
//! facts.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use labelmesh_core::TimerHandle;
use rsa::RsaPublicKey;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use labelmesh_crypto::GroupKey;

/// A live peer, keyed by `(host, port)` in [`crate::tables::PeerTable`].
pub struct PeerRecord {
    pub eol: f64,
    pub timer: TimerHandle,
}

/// One next-hop candidate for a client in the route table.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub addr: SocketAddr,
    pub score: f64,
}

/// A client's current advert.
pub struct AdvertRecord {
    pub labels: HashSet<String>,
    pub score: f64,
    pub ttp: f64,
    pub eol: f64,
    pub timer: TimerHandle,
}

/// An active interest on `(label, requester client)`.
pub struct InterestRecord {
    pub after: f64,
    pub ttp: f64,
    pub eol: f64,
    pub timer: TimerHandle,
}

/// The cached latest `set` for a label.
pub struct ContentRecord {
    pub data: Option<String>,
    pub at: f64,
    pub last: f64,
    pub dst: Vec<(f64, String)>,
    pub notify: Arc<Notify>,
}

impl ContentRecord {
    pub fn empty() -> Self {
        Self {
            data: None,
            at: 0.0,
            last: 0.0,
            dst: Vec::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// A group's confidentiality state (spec.md §3 "Group").
#[derive(Default)]
pub struct GroupState {
    /// Cleartext labels the local client publishes in this group.
    pub labels: HashSet<String>,
    /// The overlay (`group//label`) names currently advertised.
    pub encrypted_labels: HashSet<String>,
    /// Member client name -> that member's RSA public key.
    pub keys: HashMap<String, RsaPublicKey>,
    /// Current symmetric group key, once minted/received.
    pub raw_key: Option<GroupKey>,
    /// Time the current key was minted; `0.0` means no key yet.
    pub at: f64,
    /// Per-peer invite consume loops, cancelled on shutdown.
    pub tasks: HashMap<String, JoinHandle<()>>,
}
