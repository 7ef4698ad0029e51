//! Deadline-ordered outgoing batches (spec.md §4.G).
//!
//! The broadcast queue holds peer/advert items bound for the next shared
//! UDP datagram. The unicast queue holds get/set items bound for one
//! client, along with the *ordered* next-hop candidates known at enqueue
//! time — resolving which next-hop to actually use, and what to do when
//! the list is empty or a send fails, is the batch flusher's job in
//! `crate::node` (it needs the route table and the main/non-main
//! distinction, neither of which this module should know about).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::net::SocketAddr;

use labelmesh_core::{Deadline, Item};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub deadline: Deadline,
    sequence: u64,
    pub item: Item,
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.sequence).cmp(&(other.deadline, other.sequence))
    }
}

/// The broadcast queue: earliest deadline first, bounded by
/// `BROADCAST_CAPACITY` (spec.md §4.C) at flush time.
#[derive(Default)]
pub struct BroadcastQueue {
    heap: BinaryHeap<Reverse<QueueItem>>,
    next_sequence: u64,
}

impl BroadcastQueue {
    pub fn push(&mut self, deadline: Deadline, item: Item) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(QueueItem {
            deadline,
            sequence,
            item,
        }));
    }

    pub fn pop(&mut self) -> Option<QueueItem> {
        self.heap.pop().map(|Reverse(i)| i)
    }

    pub fn push_back(&mut self, entry: QueueItem) {
        self.heap.push(Reverse(entry));
    }

    pub fn peek_deadline(&self) -> Option<Deadline> {
        self.heap.peek().map(|Reverse(i)| i.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// One entry in the unicast queue: a `get` or `set` item headed toward
/// `target_client`'s next hop, with the ordered route candidates known
/// when it was enqueued. `target_client = None` marks the special
/// "relay through the local main node" item a non-main node enqueues
/// alongside a `get` (spec.md §4.H `on_get`); its `routes` is always
/// empty and is never refilled from the route table.
#[derive(Debug, Clone, PartialEq)]
pub struct UnicastEntry {
    pub deadline: Deadline,
    sequence: u64,
    pub target_client: Option<String>,
    pub routes: Vec<SocketAddr>,
    pub item: Item,
}

#[derive(Default)]
pub struct UnicastQueue {
    heap: BinaryHeap<Reverse<UnicastOrd>>,
    next_sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct UnicastOrd(UnicastEntry);

impl Eq for UnicastOrd {}

impl PartialOrd for UnicastOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnicastOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0.deadline, self.0.sequence).cmp(&(other.0.deadline, other.0.sequence))
    }
}

impl UnicastQueue {
    pub fn push(
        &mut self,
        deadline: Deadline,
        target_client: Option<String>,
        routes: Vec<SocketAddr>,
        item: Item,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(UnicastOrd(UnicastEntry {
            deadline,
            sequence,
            target_client,
            routes,
            item,
        })));
    }

    pub fn pop(&mut self) -> Option<UnicastEntry> {
        self.heap.pop().map(|Reverse(UnicastOrd(e))| e)
    }

    pub fn push_back(&mut self, entry: UnicastEntry) {
        self.heap.push(Reverse(UnicastOrd(entry)));
    }

    pub fn peek_deadline(&self) -> Option<Deadline> {
        self.heap.peek().map(|Reverse(UnicastOrd(e))| e.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::wire::Item;

    fn peer(eol: f64) -> Item {
        Item::Peer { e: eol }
    }

    #[test]
    fn broadcast_queue_pops_in_deadline_order() {
        let mut q = BroadcastQueue::default();
        q.push(Deadline(3.0), peer(30.0));
        q.push(Deadline(1.0), peer(10.0));
        q.push(Deadline(2.0), peer(20.0));

        let first = q.pop().unwrap();
        let second = q.pop().unwrap();
        let third = q.pop().unwrap();
        assert_eq!(first.deadline, Deadline(1.0));
        assert_eq!(second.deadline, Deadline(2.0));
        assert_eq!(third.deadline, Deadline(3.0));
    }

    #[test]
    fn ties_break_fifo_by_insertion_order() {
        let mut q = BroadcastQueue::default();
        q.push(Deadline(5.0), peer(1.0));
        q.push(Deadline(5.0), peer(2.0));
        let a = q.pop().unwrap();
        let b = q.pop().unwrap();
        assert_eq!(a.item, peer(1.0));
        assert_eq!(b.item, peer(2.0));
    }

    #[test]
    fn unicast_queue_pops_by_deadline_across_all_targets() {
        let mut uq = UnicastQueue::default();
        let a: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        uq.push(Deadline(9.0), Some("alice".into()), vec![a], peer(1.0));
        uq.push(Deadline(4.0), Some("bob".into()), vec![b], peer(2.0));

        let first = uq.pop().unwrap();
        assert_eq!(first.target_client.as_deref(), Some("bob"));
        let second = uq.pop().unwrap();
        assert_eq!(second.target_client.as_deref(), Some("alice"));
    }

    #[test]
    fn push_back_preserves_an_entry_for_later_redelivery() {
        let mut uq = UnicastQueue::default();
        uq.push(Deadline(1.0), None, vec![], peer(1.0));
        let entry = uq.pop().unwrap();
        assert!(uq.is_empty());
        uq.push_back(entry);
        assert_eq!(uq.len(), 1);
    }
}
