//! The node actor (spec.md §4-§5): a single task owns every mutable
//! table and is the only thing that ever gets `&mut NodeState`. Every
//! other piece of the node — the UDP/TCP receive loops, the heartbeat
//! ticker, timer callbacks, and the client-facing [`NodeHandle`] — only
//! ever sends a [`Command`] into its mailbox, the same "mutation funnels
//! through one channel" shape the teacher's `NetworkNode` uses around
//! its locked peer map, minus the lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use labelmesh_core::{
    Clock, Deadline, Item, Message, RandomSource, SystemClock, ThreadRandom, TimerHandle,
    TimerService, BROADCAST_CAPACITY, DEADLINE_EXT, MAX_SCORE,
};
use labelmesh_crypto::label::{encrypted_label, invite_label};
use labelmesh_crypto::{generate_keypair, private_key_from_pem, private_key_to_pem, GroupKey, InviteEnvelope};
use labelmesh_net::{TcpReceiver, UdpTransport};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::{BroadcastQueue, UnicastEntry, UnicastQueue};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::group;
use crate::model::GroupState;
use crate::tables::{AdvertStore, ContentStore, InterestStore, PeerTable, RouteTable};
use crate::transport::{RealTransport, Transport};

/// Messages the actor processes one at a time (spec.md §5). Variants a
/// caller waits on carry a `oneshot` reply; timer- and transport-origin
/// variants don't need one.
pub enum Command {
    Inbound(SocketAddr, Message),
    PeerExpired(SocketAddr),
    AdvertExpired(String),
    InterestExpired(String, String),
    FlushBroadcast,
    FlushUnicast,
    Heartbeat,
    RunGet {
        client: String,
        label: String,
        ttp: f64,
        ttl: f64,
    },
    RunSet {
        label: String,
        data: Option<String>,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    SubscribeContent {
        label: String,
        reply: oneshot::Sender<Arc<Notify>>,
    },
    ConsumeIfNewer {
        label: String,
        group: Option<String>,
        reply: oneshot::Sender<Result<Option<String>, NodeError>>,
    },
    EncryptForGroup {
        group: String,
        plaintext: Vec<u8>,
        reply: oneshot::Sender<Result<String, NodeError>>,
    },
    Join {
        group: String,
        peer_client: String,
        peer_public_key: RsaPublicKey,
        labels: Vec<String>,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    ConsumeInvite {
        group: String,
        peer_client: String,
        raw: String,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    RegisterGroupTask {
        group: String,
        peer_client: String,
        task: JoinHandle<()>,
    },
    Status {
        reply: oneshot::Sender<DebugStatus>,
    },
    Shutdown,
}

/// Snapshot of table sizes for the debug endpoint (spec.md §1 — thin and
/// out of the protocol core).
#[derive(Debug, Clone, serde::Serialize)]
pub struct DebugStatus {
    pub is_main: bool,
    pub peer_count: usize,
    pub client_count: usize,
    pub interest_label_count: usize,
    pub group_count: usize,
}

fn wire_label(label: &str, group: Option<&str>) -> String {
    match group {
        Some(g) => encrypted_label(g, label),
        None => label.to_string(),
    }
}

/// All node state, owned exclusively by the actor task.
pub struct NodeState {
    pub(crate) config: NodeConfig,
    pub(crate) clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    pub(crate) timers: TimerService,
    pub(crate) cmd_tx: mpsc::Sender<Command>,
    pub(crate) peers: PeerTable,
    pub(crate) routes: RouteTable,
    pub(crate) adverts: AdvertStore,
    pub(crate) interests: InterestStore,
    pub(crate) content: ContentStore,
    pub(crate) groups: HashMap<String, GroupState>,
    pub(crate) broadcast: BroadcastQueue,
    pub(crate) unicast: UnicastQueue,
    transport: Arc<dyn Transport>,
    signing_key: Option<RsaPrivateKey>,
    broadcast_timer: Option<TimerHandle>,
    unicast_timer: Option<TimerHandle>,
}

impl NodeState {
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        cmd_tx: mpsc::Sender<Command>,
        signing_key: Option<RsaPrivateKey>,
    ) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            timers: TimerService::new(),
            cmd_tx,
            peers: PeerTable::default(),
            routes: RouteTable::default(),
            adverts: AdvertStore::default(),
            interests: InterestStore::default(),
            content: ContentStore::default(),
            groups: HashMap::new(),
            broadcast: BroadcastQueue::default(),
            unicast: UnicastQueue::default(),
            transport,
            signing_key,
            broadcast_timer: None,
            unicast_timer: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Process one command, returning `false` once the actor should stop.
    pub async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Inbound(addr, msg) => self.handle_message(addr, msg),
            Command::PeerExpired(addr) => self.on_peer_expired(addr),
            Command::AdvertExpired(client) => self.on_advert_expired(client),
            Command::InterestExpired(label, client) => self.on_interest_expired(label, client),
            Command::FlushBroadcast => self.flush_broadcast().await,
            Command::FlushUnicast => self.flush_unicast().await,
            Command::Heartbeat => self.emit_heartbeat(),
            Command::RunGet { client, label, ttp, ttl } => self.run_get(client, label, ttp, ttl),
            Command::RunSet { label, data, reply } => {
                let res = self.run_set(label, data);
                let _ = reply.send(res);
            }
            Command::SubscribeContent { label, reply } => {
                let notify = self.content.entry_or_empty(&label).notify.clone();
                let _ = reply.send(notify);
            }
            Command::ConsumeIfNewer { label, group, reply } => {
                let res = self.consume_if_newer(&label, group.as_deref());
                let _ = reply.send(res);
            }
            Command::EncryptForGroup { group, plaintext, reply } => {
                let res = self.encrypt_for_group(&group, &plaintext);
                let _ = reply.send(res);
            }
            Command::Join { group, peer_client, peer_public_key, labels, reply } => {
                let res = self.handle_join(group, peer_client, peer_public_key, labels);
                let _ = reply.send(res);
            }
            Command::ConsumeInvite { group, peer_client, raw, reply } => {
                let res = self.consume_invite(&group, &peer_client, &raw);
                let _ = reply.send(res);
            }
            Command::RegisterGroupTask { group, peer_client, task } => {
                self.register_group_task(group, peer_client, task);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {
                self.shutdown_internal();
                return false;
            }
        }
        self.reschedule_broadcast();
        self.reschedule_unicast();
        true
    }

    /// Flush the broadcast queue into at most one datagram (spec.md
    /// §4.G): earliest-deadline-first, always take the first item
    /// regardless of size, then greedily add more while the encoded
    /// message stays under the soft cap. An `Advert`'s score is
    /// perturbed only on the outgoing copy — the item pushed back
    /// unsent keeps its original, un-perturbed score so perturbation is
    /// re-rolled fresh on the next flush.
    async fn flush_broadcast(&mut self) {
        let mut items = Vec::new();
        loop {
            let Some(entry) = self.broadcast.pop() else { break };
            let wire_item = self.perturb_for_wire(&entry.item);
            let mut candidate = items.clone();
            candidate.push(wire_item.clone());
            let fits = items.is_empty() || Message::new(candidate).encoded_len() <= BROADCAST_CAPACITY;
            if fits {
                items.push(wire_item);
            } else {
                self.broadcast.push_back(entry);
                break;
            }
        }
        if items.is_empty() {
            return;
        }
        if let Err(err) = self.transport.broadcast(&Message::new(items)).await {
            warn!(error = %err, "broadcast flush failed");
        }
    }

    fn perturb_for_wire(&self, item: &Item) -> Item {
        match item {
            Item::Advert { c, l, s, p, e } => {
                let u = self.random.uniform(0.0, 0.5);
                Item::Advert {
                    c: c.clone(),
                    l: l.clone(),
                    s: s - (1.0 + u),
                    p: *p,
                    e: *e,
                }
            }
            other => other.clone(),
        }
    }

    /// Resolve `entry`'s destination (spec.md §4.G): a main node targets
    /// `routes[0]`, refilling an empty route list from the current route
    /// table or deferring with an extended deadline if none is known; a
    /// non-main node always targets its local main node and never
    /// touches `routes` at all.
    fn resolve_or_defer(&mut self, mut entry: UnicastEntry) -> Result<(SocketAddr, UnicastEntry), UnicastEntry> {
        if !self.config.is_main() {
            let dst = SocketAddr::from(([127, 0, 0, 1], self.config.dport));
            return Ok((dst, entry));
        }
        if entry.routes.is_empty() {
            if let Some(client) = entry.target_client.clone() {
                entry.routes = self.route_addrs(&client);
            }
        }
        if entry.routes.is_empty() {
            entry.deadline = Deadline(self.clock.now() + DEADLINE_EXT.as_secs_f64());
            return Err(entry);
        }
        let dst = entry.routes[0];
        Ok((dst, entry))
    }

    /// Flush the unicast queue (spec.md §4.G): drain it fully, grouping
    /// every entry whose resolved destination matches the first one
    /// popped into a single batch, stashing the rest back unresolved. On
    /// send failure, a main node drops the failed next-hop and retries
    /// at the same deadline; a non-main node extends the deadline by
    /// `DEADLINE_EXT` and tries again later.
    async fn flush_unicast(&mut self) {
        let mut batch: Vec<UnicastEntry> = Vec::new();
        let mut target: Option<SocketAddr> = None;
        let mut stash: Vec<UnicastEntry> = Vec::new();
        let mut deferred: Vec<UnicastEntry> = Vec::new();

        while let Some(entry) = self.unicast.pop() {
            match self.resolve_or_defer(entry) {
                Err(entry) => deferred.push(entry),
                Ok((dst, resolved)) => match target {
                    None => {
                        target = Some(dst);
                        batch.push(resolved);
                    }
                    Some(t) if t == dst => batch.push(resolved),
                    Some(_) => stash.push(resolved),
                },
            }
        }
        for entry in stash.into_iter().chain(deferred) {
            self.unicast.push_back(entry);
        }
        let (Some(dst), false) = (target, batch.is_empty()) else { return };

        let items: Vec<Item> = batch.iter().map(|e| e.item.clone()).collect();
        if let Err(err) = self.transport.send_unicast(dst, &Message::new(items)).await {
            warn!(%dst, error = %err, "unicast flush failed, requeueing batch");
            for mut entry in batch {
                if self.config.is_main() {
                    if !entry.routes.is_empty() {
                        entry.routes.remove(0);
                    }
                } else {
                    entry.deadline = Deadline(self.clock.now() + DEADLINE_EXT.as_secs_f64());
                }
                self.unicast.push_back(entry);
            }
        }
    }

    /// Cancel and reinstall the broadcast timer at the midpoint between
    /// now and the queue's earliest deadline (spec.md §4.G).
    fn reschedule_broadcast(&mut self) {
        if let Some(old) = self.broadcast_timer.take() {
            old.cancel();
        }
        let Some(deadline) = self.broadcast.peek_deadline() else { return };
        let now = self.clock.now();
        let fire_at = now + (deadline.0 - now).max(0.0) / 2.0;
        let tx = self.cmd_tx.clone();
        self.broadcast_timer = Some(self.timers.schedule(self.clock.clone(), fire_at, async move {
            let _ = tx.send(Command::FlushBroadcast).await;
        }));
    }

    fn reschedule_unicast(&mut self) {
        if let Some(old) = self.unicast_timer.take() {
            old.cancel();
        }
        let Some(deadline) = self.unicast.peek_deadline() else { return };
        let now = self.clock.now();
        let fire_at = now + (deadline.0 - now).max(0.0) / 2.0;
        let tx = self.cmd_tx.clone();
        self.unicast_timer = Some(self.timers.schedule(self.clock.clone(), fire_at, async move {
            let _ = tx.send(Command::FlushUnicast).await;
        }));
    }

    /// Every label this node currently publishes: its own client's
    /// cleartext labels, plus for every joined group the invite label it
    /// publishes under and the group's current namespaced label set.
    fn current_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(client) = &self.config.client {
            labels.extend(client.labels.iter().cloned());
        }
        if let Some(own) = self.own_client_name() {
            for (group_name, group_state) in &self.groups {
                labels.push(invite_label(group_name, own));
                labels.extend(group_state.encrypted_labels.iter().cloned());
            }
        }
        labels
    }

    fn emit_heartbeat(&mut self) {
        let now = self.clock.now();
        let eol = now + self.config.ttl;
        self.broadcast.push(Deadline(now), Item::Peer { e: eol });
        if let Some(client) = self.config.client.clone() {
            let item = Item::Advert {
                c: client.name,
                l: self.current_labels(),
                s: MAX_SCORE,
                p: client.ttp,
                e: eol,
            };
            self.broadcast.push(Deadline(now), item);
        }
    }

    fn run_get(&mut self, client: String, label: String, ttp: f64, ttl: f64) {
        let now = self.clock.now();
        let after = self.content.get(&label).map(|c| c.last).unwrap_or(0.0);
        self.on_get(client, label, after, ttp, now + ttl);
    }

    fn run_set(&mut self, label: String, data: Option<String>) -> Result<(), NodeError> {
        let now = self.clock.now();
        let dst: Vec<(f64, String)> = self
            .interests
            .clients_for_label(&label)
            .map(|clients| clients.iter().map(|(name, rec)| (rec.ttp, name.clone())).collect())
            .unwrap_or_default();
        self.on_set(label, data, now, dst);
        Ok(())
    }

    fn group_key(&self, group: &str) -> Option<GroupKey> {
        self.groups.get(group).and_then(|g| g.raw_key)
    }

    /// Serve a cached value newer than what this caller already consumed
    /// (spec.md §4.I): a group-scoped read decrypts on the way out and a
    /// decrypt failure (key not adopted yet) is treated as "nothing new"
    /// rather than an error, per spec.md §7's retry-on-crypto-failure
    /// rule — the label's `last` marker is only advanced on success.
    fn consume_if_newer(&mut self, wire_label: &str, group: Option<&str>) -> Result<Option<String>, NodeError> {
        let Some(record) = self.content.get(wire_label) else { return Ok(None) };
        if record.at <= record.last {
            return Ok(None);
        }
        let at = record.at;
        let raw = record.data.clone();
        let plaintext = match group {
            Some(g) => {
                let Some(token) = raw else { return Ok(None) };
                let Some(key) = self.group_key(g) else { return Ok(None) };
                match labelmesh_crypto::symmetric::decrypt(&key, &token) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(_) => return Ok(None),
                }
            }
            None => raw.unwrap_or_default(),
        };
        self.content.entry_or_empty(wire_label).last = at;
        Ok(Some(plaintext))
    }

    fn encrypt_for_group(&self, group: &str, plaintext: &[u8]) -> Result<String, NodeError> {
        let key = self
            .group_key(group)
            .ok_or_else(|| NodeError::Precondition(format!("no key for group {group} yet")))?;
        let now = self.clock.now();
        Ok(labelmesh_crypto::symmetric::encrypt(&key, now, plaintext)?)
    }

    /// `join()` step 1-2 (spec.md §4.I): register this client's labels
    /// in the group (only on the first call), record the peer's public
    /// key, and publish whatever invite this node can currently build.
    fn handle_join(
        &mut self,
        group_name: String,
        peer_client: String,
        peer_public_key: RsaPublicKey,
        labels: Vec<String>,
    ) -> Result<(), NodeError> {
        let entry = self.groups.entry(group_name.clone()).or_default();
        if entry.labels.is_empty() {
            entry.labels = labels.into_iter().collect();
        }
        entry.keys.insert(peer_client, peer_public_key);
        group::refresh_encrypted_labels(&group_name, entry);
        self.publish_invites(&group_name)
    }

    /// Publish this node's invite envelope under `group/own_client`
    /// (spec.md §4.I step 3) by routing it through the ordinary `set`
    /// path — delivery to interested peers happens lazily the same way
    /// any other cached label does.
    fn publish_invites(&mut self, group_name: &str) -> Result<(), NodeError> {
        let Some(own_key) = self.signing_key.clone() else {
            return Err(NodeError::Precondition("node has no client identity".into()));
        };
        let Some(own_name) = self.own_client_name().map(str::to_string) else {
            return Err(NodeError::Precondition("node has no client identity".into()));
        };
        let now = self.clock.now();
        let Some(group_state) = self.groups.get(group_name) else { return Ok(()) };
        let Some(envelope) = group::build_invite_envelope(&own_key, now, group_state)? else {
            return Ok(());
        };
        let payload = serde_json::to_string(&envelope).map_err(|e| NodeError::Fatal(e.to_string()))?;
        let label = invite_label(group_name, &own_name);
        self.run_set(label, Some(payload))
    }

    /// Consume one verified invite (spec.md §4.I step 4): verify the
    /// envelope against the peer's stored key, apply mint/adopt/ignore
    /// policy, and republish if the group's key changed.
    fn consume_invite(&mut self, group_name: &str, peer_client: &str, raw: &str) -> Result<(), NodeError> {
        let envelope: InviteEnvelope =
            serde_json::from_str(raw).map_err(|e| NodeError::Precondition(format!("malformed invite envelope: {e}")))?;
        let peer_key = {
            let Some(group_state) = self.groups.get(group_name) else {
                return Err(NodeError::Precondition(format!("unknown group {group_name}")));
            };
            let Some(key) = group_state.keys.get(peer_client) else {
                return Err(NodeError::Precondition(format!("unknown public key for {peer_client}")));
            };
            key.clone()
        };
        let invite = labelmesh_crypto::open_invite_envelope(&envelope, &peer_key)?;

        let Some(own_key) = self.signing_key.clone() else {
            return Err(NodeError::Precondition("node has no client identity".into()));
        };
        let Some(own_name) = self.own_client_name().map(str::to_string) else {
            return Err(NodeError::Precondition("node has no client identity".into()));
        };
        let now = self.clock.now();
        let changed = {
            let group_state = self.groups.entry(group_name.to_string()).or_default();
            group::apply_incoming_invite(&own_key, &own_name, now, group_state, &invite)?
        };
        if changed {
            group::refresh_encrypted_labels(group_name, self.groups.get_mut(group_name).unwrap());
            self.publish_invites(group_name)?;
        }
        Ok(())
    }

    fn register_group_task(&mut self, group_name: String, peer_client: String, task: JoinHandle<()>) {
        let entry = self.groups.entry(group_name).or_default();
        if let Some(old) = entry.tasks.insert(peer_client, task) {
            old.abort();
        }
    }

    fn status(&self) -> DebugStatus {
        DebugStatus {
            is_main: self.config.is_main(),
            peer_count: self.peers.len(),
            client_count: self.adverts.iter().count(),
            interest_label_count: self.interests.label_count(),
            group_count: self.groups.len(),
        }
    }

    fn shutdown_internal(&mut self) {
        for group_state in self.groups.values() {
            for task in group_state.tasks.values() {
                task.abort();
            }
        }
        if let Some(h) = self.broadcast_timer.take() {
            h.cancel();
        }
        if let Some(h) = self.unicast_timer.take() {
            h.cancel();
        }
    }
}

/// Load this client's RSA signing key from `path`, generating and
/// persisting a fresh one if it's absent or unreadable. Grounded in the
/// teacher's `load_or_create_identity` (`wichain-backend/src-tauri/src/main.rs`).
fn load_or_create_signing_key(path: Option<&Path>) -> Result<RsaPrivateKey, NodeError> {
    let Some(path) = path else {
        let (key, _) = generate_keypair()?;
        return Ok(key);
    };
    if let Ok(pem) = std::fs::read_to_string(path) {
        match private_key_from_pem(&pem) {
            Ok(key) => return Ok(key),
            Err(err) => warn!(path = %path.display(), error = %err, "stored signing key unreadable, regenerating"),
        }
    }
    let (key, _) = generate_keypair()?;
    let pem = private_key_to_pem(&key)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NodeError::Fatal(e.to_string()))?;
    }
    std::fs::write(path, pem).map_err(|e| NodeError::Fatal(e.to_string()))?;
    Ok(key)
}

/// The cheap, cloneable client surface. Holds nothing but a mailbox
/// handle, so cloning it is just cloning an `mpsc::Sender`.
#[derive(Clone)]
pub struct NodeHandle {
    cmd_tx: mpsc::Sender<Command>,
    client_name: Option<String>,
}

impl NodeHandle {
    fn require_client(&self) -> Result<&str, NodeError> {
        self.client_name
            .as_deref()
            .ok_or_else(|| NodeError::Precondition("node has no client identity".into()))
    }

    async fn consume_if_newer(&self, wire_label: &str, group: Option<&str>) -> Result<Option<String>, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ConsumeIfNewer {
                label: wire_label.to_string(),
                group: group.map(str::to_string),
                reply: tx,
            })
            .await?;
        rx.await?
    }

    /// Fetch `label`, polling and re-issuing `get` at `ttl/tpf` cadence
    /// until a value newer than anything previously consumed arrives or
    /// the content store is notified directly by an inbound `set`.
    pub async fn get(&self, label: &str, ttl: f64, tpf: f64, ttp: f64, group: Option<&str>) -> Result<String, NodeError> {
        let client = self.require_client()?.to_string();
        let wire = wire_label(label, group);
        let poll_interval = Duration::from_secs_f64((ttl / tpf).max(0.01));

        let (sub_tx, sub_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SubscribeContent { label: wire.clone(), reply: sub_tx })
            .await?;
        let notify = sub_rx.await?;

        loop {
            if let Some(value) = self.consume_if_newer(&wire, group).await? {
                return Ok(value);
            }
            self.cmd_tx
                .send(Command::RunGet { client: client.clone(), label: wire.clone(), ttp, ttl })
                .await?;
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Publish `data` under `label`, encrypting it for `group` first if
    /// one was given.
    pub async fn set(&self, label: &str, data: Option<&str>, group: Option<&str>) -> Result<(), NodeError> {
        self.require_client()?;
        let payload = match (group, data) {
            (Some(g), Some(plaintext)) => {
                let (tx, rx) = oneshot::channel();
                self.cmd_tx
                    .send(Command::EncryptForGroup {
                        group: g.to_string(),
                        plaintext: plaintext.as_bytes().to_vec(),
                        reply: tx,
                    })
                    .await?;
                Some(rx.await??)
            }
            (Some(_), None) => None,
            (None, data) => data.map(str::to_string),
        };
        let wire = wire_label(label, group);
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::RunSet { label: wire, data: payload, reply: tx }).await?;
        rx.await?
    }

    /// `join()` (spec.md §4.I): register the peer's public key and our
    /// labels, then spawn a background task that repeatedly `get`s
    /// `group/peer_client` and feeds each returned invite back to the
    /// actor, looping indefinitely to pick up every future key rotation.
    pub async fn join(
        &self,
        group_name: &str,
        peer_client: &str,
        peer_public_key: RsaPublicKey,
        labels: Vec<String>,
        ttl: f64,
        tpf: f64,
        ttp: f64,
    ) -> Result<(), NodeError> {
        self.require_client()?;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Join {
                group: group_name.to_string(),
                peer_client: peer_client.to_string(),
                peer_public_key,
                labels,
                reply: tx,
            })
            .await?;
        rx.await??;

        let label = invite_label(group_name, peer_client);
        let handle = self.clone();
        let group_owned = group_name.to_string();
        let peer_owned = peer_client.to_string();
        let task = tokio::spawn(async move {
            loop {
                let Ok(raw) = handle.get(&label, ttl, tpf, ttp, None).await else { break };
                let (tx, rx) = oneshot::channel();
                let sent = handle
                    .cmd_tx
                    .send(Command::ConsumeInvite {
                        group: group_owned.clone(),
                        peer_client: peer_owned.clone(),
                        raw,
                        reply: tx,
                    })
                    .await;
                if sent.is_err() {
                    break;
                }
                if let Ok(Err(err)) = rx.await {
                    warn!(group = %group_owned, peer = %peer_owned, error = %err, "invite consumption failed");
                }
            }
        });
        self.cmd_tx
            .send(Command::RegisterGroupTask { group: group_name.to_string(), peer_client: peer_client.to_string(), task })
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<DebugStatus, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Status { reply: tx }).await?;
        Ok(rx.await?)
    }
}

/// An owned, running node: the actor task plus its three peripheral
/// tasks (UDP receive, TCP receive, heartbeat). Not `Clone` — only
/// `handle` is meant to be shared.
pub struct Node {
    pub handle: NodeHandle,
    actor_task: JoinHandle<()>,
    udp_task: JoinHandle<()>,
    tcp_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let udp = Arc::new(UdpTransport::bind(config.port).await?);
        let tcp = TcpReceiver::bind(config.port).await?;
        let transport: Arc<dyn Transport> = Arc::new(RealTransport::new(udp.clone(), config.dport));

        let signing_key = match &config.client {
            Some(client) => Some(load_or_create_signing_key(client.key_path.as_deref())?),
            None => None,
        };
        let client_name = config.client.as_ref().map(|c| c.name.clone());

        let (cmd_tx, mut cmd_rx) = mpsc::channel(1024);
        let mut state = NodeState::new(config.clone(), transport, cmd_tx.clone(), signing_key);

        let udp_tx = cmd_tx.clone();
        let udp_for_recv = udp.clone();
        let udp_task = tokio::spawn(async move {
            loop {
                match udp_for_recv.recv().await {
                    Ok((addr, msg)) => {
                        if udp_tx.send(Command::Inbound(addr, msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "udp receive loop error"),
                }
            }
        });

        let tcp_tx = cmd_tx.clone();
        let tcp_task = tokio::spawn(async move {
            loop {
                match tcp.recv().await {
                    Ok((addr, msg)) => {
                        if tcp_tx.send(Command::Inbound(addr, msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "tcp receive loop error"),
                }
            }
        });

        let heartbeat_tx = cmd_tx.clone();
        let period = Duration::from_secs_f64((config.ttl / config.tpf).max(0.1));
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if heartbeat_tx.send(Command::Heartbeat).await.is_err() {
                    break;
                }
            }
        });

        let actor_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if !state.handle_command(cmd).await {
                    break;
                }
            }
        });

        info!(port = config.port, dport = config.dport, is_main = config.is_main(), "node started");

        Ok(Self {
            handle: NodeHandle { cmd_tx, client_name },
            actor_task,
            udp_task,
            tcp_task,
            heartbeat_task,
        })
    }

    /// Stop the peripheral tasks, signal the actor, and wait for it to
    /// drain — with a timeout backstop in case it's wedged.
    pub async fn shutdown(self) {
        self.udp_task.abort();
        self.tcp_task.abort();
        self.heartbeat_task.abort();
        let _ = self.handle.cmd_tx.send(Command::Shutdown).await;
        let _ = tokio::time::timeout(Duration::from_secs(5), self.actor_task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::mock::MockTransport;
    use labelmesh_core::{FixedClock, ZeroRandom};

    fn config_with(port: u16, dport: u16, client: Option<ClientConfig>) -> NodeConfig {
        NodeConfig { port, dport, ttl: 30.0, tpf: 3.0, client, debug_port: None }
    }

    fn test_state(
        cmd_tx: mpsc::Sender<Command>,
        transport: Arc<MockTransport>,
        port: u16,
        dport: u16,
        now: f64,
    ) -> NodeState {
        NodeState::new(config_with(port, dport, None), transport, cmd_tx, None)
            .with_clock(Arc::new(FixedClock::new(now)) as Arc<dyn Clock>)
            .with_random(Arc::new(ZeroRandom) as Arc<dyn RandomSource>)
    }

    fn test_client_state(cmd_tx: mpsc::Sender<Command>, transport: Arc<MockTransport>) -> NodeState {
        let client = ClientConfig { name: "alice".into(), ttp: 1.0, labels: vec!["weather".into()], key_path: None };
        NodeState::new(config_with(9001, 9000, Some(client)), transport, cmd_tx, None)
            .with_clock(Arc::new(FixedClock::new(1.0)) as Arc<dyn Clock>)
            .with_random(Arc::new(ZeroRandom) as Arc<dyn RandomSource>)
    }

    fn padded_labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("label-{i:04}")).collect()
    }

    #[tokio::test]
    async fn flush_broadcast_sends_small_items_together() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 1.0);
        state.broadcast.push(Deadline(1.0), Item::Peer { e: 10.0 });
        state.broadcast.push(Deadline(2.0), Item::Peer { e: 20.0 });
        state.flush_broadcast().await;
        let sent = transport.broadcasts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].items.len(), 2);
    }

    #[tokio::test]
    async fn flush_broadcast_always_sends_first_item_even_if_oversized() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 1.0);
        let huge = Item::Advert { c: "alice".into(), l: padded_labels(200), s: 100.0, p: 1.0, e: 5.0 };
        state.broadcast.push(Deadline(1.0), huge);
        state.broadcast.push(Deadline(2.0), Item::Peer { e: 30.0 });
        state.flush_broadcast().await;
        let sent = transport.broadcasts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].items.len(), 1);
        assert_eq!(state.broadcast.len(), 1);
    }

    #[tokio::test]
    async fn unsent_advert_is_pushed_back_without_perturbation_baked_in() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 1.0);
        let a = Item::Advert { c: "alice".into(), l: padded_labels(40), s: 500.0, p: 1.0, e: 5.0 };
        let b = Item::Advert { c: "bob".into(), l: padded_labels(40), s: 500.0, p: 1.0, e: 5.0 };
        state.broadcast.push(Deadline(1.0), a);
        state.broadcast.push(Deadline(2.0), b);
        state.flush_broadcast().await;
        assert_eq!(state.broadcast.len(), 1);
        let remaining = state.broadcast.pop().unwrap();
        match remaining.item {
            Item::Advert { s, .. } => assert_eq!(s, 500.0),
            other => panic!("expected advert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_unicast_batches_entries_sharing_a_destination() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 1.0);
        let dst: SocketAddr = "127.0.0.1:9200".parse().unwrap();
        let other: SocketAddr = "127.0.0.1:9300".parse().unwrap();
        state.unicast.push(Deadline(1.0), Some("bob".into()), vec![dst], Item::Peer { e: 1.0 });
        state.unicast.push(Deadline(2.0), Some("bob".into()), vec![dst], Item::Peer { e: 2.0 });
        state.unicast.push(Deadline(3.0), Some("carol".into()), vec![other], Item::Peer { e: 3.0 });
        state.flush_unicast().await;
        let sent = transport.unicasts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, dst);
        assert_eq!(sent[0].1.items.len(), 2);
        assert_eq!(state.unicast.len(), 1);
    }

    #[tokio::test]
    async fn flush_unicast_main_node_retries_next_route_on_failure() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let primary: SocketAddr = "127.0.0.1:9101".parse().unwrap();
        let backup: SocketAddr = "127.0.0.1:9102".parse().unwrap();
        transport.fail_unicast_to.lock().unwrap().insert(primary);
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 1.0);
        state.unicast.push(Deadline(1.0), Some("bob".into()), vec![primary, backup], Item::Peer { e: 1.0 });
        state.flush_unicast().await;
        assert!(transport.unicasts.lock().unwrap().is_empty());
        assert_eq!(state.unicast.len(), 1);
        let entry = state.unicast.pop().unwrap();
        assert_eq!(entry.routes, vec![backup]);
        assert_eq!(entry.deadline, Deadline(1.0));
    }

    #[tokio::test]
    async fn flush_unicast_non_main_extends_deadline_on_failure() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let local_main: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        transport.fail_unicast_to.lock().unwrap().insert(local_main);
        let mut state = test_state(tx, transport.clone(), 9001, 9000, 100.0);
        let item = Item::Get { c: "alice".into(), l: "weather".into(), a: 0.0, p: 1.0, e: 50.0 };
        state.unicast.push(Deadline(1.0), None, Vec::new(), item);
        state.flush_unicast().await;
        assert!(transport.unicasts.lock().unwrap().is_empty());
        let entry = state.unicast.pop().unwrap();
        assert_eq!(entry.deadline, Deadline(100.0 + DEADLINE_EXT.as_secs_f64()));
    }

    #[tokio::test]
    async fn flush_unicast_main_node_defers_when_no_route_known() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport.clone(), 9000, 9000, 50.0);
        let item = Item::Get { c: "alice".into(), l: "weather".into(), a: 0.0, p: 1.0, e: 50.0 };
        state.unicast.push(Deadline(1.0), Some("carol".into()), Vec::new(), item);
        state.flush_unicast().await;
        assert!(transport.unicasts.lock().unwrap().is_empty());
        let entry = state.unicast.pop().unwrap();
        assert_eq!(entry.deadline, Deadline(50.0 + DEADLINE_EXT.as_secs_f64()));
    }

    #[tokio::test]
    async fn heartbeat_enqueues_peer_and_advert_for_clients() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_client_state(tx, transport);
        state.emit_heartbeat();
        assert_eq!(state.broadcast.len(), 2);
    }

    #[tokio::test]
    async fn heartbeat_without_client_only_emits_peer() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_state(tx, transport, 9000, 9000, 1.0);
        state.emit_heartbeat();
        assert_eq!(state.broadcast.len(), 1);
    }

    #[tokio::test]
    async fn run_set_then_consume_if_newer_round_trips_cleartext() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        let mut state = test_client_state(tx, transport);
        state.run_set("weather".into(), Some("sunny".into())).unwrap();
        let value = state.consume_if_newer("weather", None).unwrap();
        assert_eq!(value, Some("sunny".to_string()));
        assert_eq!(state.consume_if_newer("weather", None).unwrap(), None);
    }
}
