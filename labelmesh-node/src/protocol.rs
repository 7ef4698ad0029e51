//! Protocol core (spec.md §4.H): the per-item handlers that keep the
//! peer/route/advert/interest/content tables coherent and push outgoing
//! work into the batch queues. Every handler is a plain method on
//! [`crate::node::NodeState`] — the actor is the only thing that ever
//! gets a `&mut NodeState`, so these can assume exclusive access the
//! same way the teacher's `recv_loop` match arms assume exclusive access
//! to its locked peer map, minus the lock.

use std::collections::HashSet;
use std::net::SocketAddr;

use labelmesh_core::{Deadline, Item, Message};

use crate::model::{AdvertRecord, InterestRecord, PeerRecord};
use crate::node::{Command, NodeState};

impl NodeState {
    /// Dispatch every item in `msg`, in the fixed order peer -> advert ->
    /// get -> set (spec.md §4.H), regardless of how they were ordered on
    /// the wire.
    pub fn handle_message(&mut self, addr: SocketAddr, msg: Message) {
        let mut peers = Vec::new();
        let mut adverts = Vec::new();
        let mut gets = Vec::new();
        let mut sets = Vec::new();
        for item in msg.items {
            match item {
                Item::Peer { e } => peers.push(e),
                Item::Advert { c, l, s, p, e } => adverts.push((c, l, s, p, e)),
                Item::Get { c, l, a, p, e } => gets.push((c, l, a, p, e)),
                Item::Set { l, d, a, c } => sets.push((l, d, a, c)),
            }
        }
        for eol in peers {
            self.on_peer(addr, eol);
        }
        for (c, l, s, p, e) in adverts {
            self.on_advert(addr, c, l, s, p, e);
        }
        for (c, l, a, p, e) in gets {
            self.on_get(c, l, a, p, e);
        }
        for (l, d, a, c) in sets {
            self.on_set(l, d, a, c);
        }
    }

    fn own_client_name(&self) -> Option<&str> {
        self.config.client.as_ref().map(|c| c.name.as_str())
    }

    /// Refresh or create the peer entry for `addr`, installing a fresh
    /// expiry timer (spec.md §4.D).
    pub fn on_peer(&mut self, addr: SocketAddr, eol: f64) {
        let tx = self.cmd_tx.clone();
        let timer = self
            .timers
            .schedule(self.clock.clone(), eol, async move {
                let _ = tx.send(Command::PeerExpired(addr)).await;
            });
        self.peers.insert(addr, PeerRecord { eol, timer });
    }

    /// On timer fire: drop the peer and every route next-hop pointing at
    /// it (spec.md §4.D).
    pub fn on_peer_expired(&mut self, addr: SocketAddr) {
        if self.peers.remove(&addr).is_some() {
            self.routes.prune_peer(&addr);
        }
    }

    /// `on_advert` (spec.md §4.H). Route/peer bookkeeping happens even
    /// for a stale advert; only the client-record refresh and
    /// propagation are gated on strictly-newer `eol`.
    pub fn on_advert(
        &mut self,
        addr: SocketAddr,
        client: String,
        labels: Vec<String>,
        score: f64,
        ttp: f64,
        eol: f64,
    ) {
        if !self.peers.contains(&addr) {
            self.on_peer(addr, eol);
        }
        if Some(client.as_str()) == self.own_client_name() {
            return;
        }
        self.routes.upsert(&client, addr, score);

        if let Some(existing) = self.adverts.get(&client) {
            if eol <= existing.eol {
                return;
            }
        }

        let now = self.clock.now();
        let previous_labels: HashSet<String> = self
            .adverts
            .get(&client)
            .map(|a| a.labels.clone())
            .unwrap_or_default();
        let new_labels: HashSet<String> = labels.iter().cloned().collect();
        let added: Vec<String> = new_labels.difference(&previous_labels).cloned().collect();

        let tx = self.cmd_tx.clone();
        let client_for_timer = client.clone();
        let timer = self
            .timers
            .schedule(self.clock.clone(), eol, async move {
                let _ = tx.send(Command::AdvertExpired(client_for_timer)).await;
            });
        self.adverts.insert(
            client.clone(),
            AdvertRecord {
                labels: new_labels,
                score,
                ttp,
                eol,
                timer,
            },
        );

        for label in added {
            let Some(interested) = self.interests.clients_for_label(&label) else {
                continue;
            };
            let pending: Vec<(String, f64, f64, f64)> = interested
                .iter()
                .map(|(requester, rec)| (requester.clone(), rec.after, rec.ttp, rec.eol))
                .collect();
            for (requester, after, req_ttp, req_eol) in pending {
                let item = Item::Get {
                    c: requester,
                    l: label.clone(),
                    a: after,
                    p: req_ttp,
                    e: req_eol,
                };
                let routes = self.route_addrs(&client);
                self.unicast
                    .push(Deadline(now + req_ttp), Some(client.clone()), routes, item);
            }
        }

        let advert_item = Item::Advert {
            c: client,
            l: labels,
            s: score,
            p: ttp,
            e: eol,
        };
        self.broadcast.push(Deadline(now + ttp), advert_item);
    }

    /// On timer fire: drop the client advert and its routes (spec.md §3).
    pub fn on_advert_expired(&mut self, client: String) {
        if self.adverts.remove(&client).is_some() {
            self.routes.remove_client(&client);
        }
    }

    /// `on_get` (spec.md §4.H).
    pub fn on_get(&mut self, client: String, label: String, after: f64, ttp: f64, eol: f64) {
        if let Some(existing) = self.interests.get(&label, &client) {
            if eol <= existing.eol {
                return;
            }
        }

        let tx = self.cmd_tx.clone();
        let label_for_timer = label.clone();
        let client_for_timer = client.clone();
        let timer = self
            .timers
            .schedule(self.clock.clone(), eol, async move {
                let _ = tx
                    .send(Command::InterestExpired(label_for_timer, client_for_timer))
                    .await;
            });
        self.interests.insert(
            label.clone(),
            client.clone(),
            InterestRecord {
                after,
                ttp,
                eol,
                timer,
            },
        );

        let now = self.clock.now();
        let own = self.own_client_name().map(str::to_string);
        let publishers: Vec<String> = self
            .adverts
            .iter()
            .filter(|(name, rec)| rec.labels.contains(&label) && Some(name.as_str()) != own.as_deref())
            .map(|(name, _)| name.clone())
            .collect();
        for publisher in publishers {
            let routes = self.route_addrs(&publisher);
            let item = Item::Get {
                c: client.clone(),
                l: label.clone(),
                a: after,
                p: ttp,
                e: eol,
            };
            self.unicast
                .push(Deadline(now + ttp), Some(publisher), routes, item);
        }

        if !self.config.is_main() {
            let relay_item = Item::Get {
                c: client.clone(),
                l: label.clone(),
                a: after,
                p: ttp,
                e: eol,
            };
            self.unicast
                .push(Deadline(now + ttp), None, Vec::new(), relay_item);
        }

        if let Some(content) = self.content.get(&label) {
            if content.at > after {
                let item = Item::Set {
                    l: label.clone(),
                    d: content.data.clone(),
                    a: content.at,
                    c: vec![(ttp, client.clone())],
                };
                let routes = self.route_addrs(&client);
                self.unicast
                    .push(Deadline(now + ttp), Some(client), routes, item);
            }
        }
    }

    /// On timer fire: drop one interest (spec.md §3).
    pub fn on_interest_expired(&mut self, label: String, client: String) {
        self.interests.remove(&label, &client);
    }

    /// `on_set` (spec.md §4.H).
    pub fn on_set(&mut self, label: String, data: Option<String>, at: f64, dst: Vec<(f64, String)>) {
        if let Some(existing) = self.content.get(&label) {
            if at <= existing.at {
                return;
            }
        }

        let now = self.clock.now();
        let entry = self.content.entry_or_empty(&label);
        entry.data = data.clone();
        entry.at = at;
        entry.dst = dst.clone();
        entry.notify.notify_waiters();

        let own = self.own_client_name().map(str::to_string);
        for (ttp, client) in dst {
            if Some(client.as_str()) == own.as_deref() {
                continue;
            }
            let item = Item::Set {
                l: label.clone(),
                d: data.clone(),
                a: at,
                c: vec![(ttp, client.clone())],
            };
            let routes = self.route_addrs(&client);
            self.unicast
                .push(Deadline(now + ttp), Some(client), routes, item);
        }
    }

    /// Snapshot of the current ordered next-hop addresses for `client`,
    /// the form the unicast queue stores alongside each entry.
    pub(crate) fn route_addrs(&self, client: &str) -> Vec<SocketAddr> {
        self.routes
            .get(client)
            .map(|entries| entries.iter().map(|e| e.addr).collect())
            .unwrap_or_default()
    }
}
