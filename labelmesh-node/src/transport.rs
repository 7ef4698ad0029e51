//! Transport abstraction the batch flushers drive (spec.md §4.G/§4.C).
//!
//! A trait rather than a concrete type, so the flush logic in
//! [`crate::node`] can be exercised against an in-memory mock instead of
//! real sockets — the same reasoning behind `sven-p2p`'s `async_trait`
//! transport seam, generalized from libp2p's swarm to our UDP/TCP pair.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use labelmesh_core::Message;
use labelmesh_net::{send_unicast, TransportError, UdpTransport};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn broadcast(&self, msg: &Message) -> Result<(), TransportError>;
    async fn send_unicast(&self, addr: SocketAddr, msg: &Message) -> Result<(), TransportError>;
}

/// Production transport: a bound UDP socket shared with the receive
/// loop, plus ad hoc TCP connections per unicast send.
pub struct RealTransport {
    udp: Arc<UdpTransport>,
    dport: u16,
}

impl RealTransport {
    pub fn new(udp: Arc<UdpTransport>, dport: u16) -> Self {
        Self { udp, dport }
    }
}

#[async_trait]
impl Transport for RealTransport {
    async fn broadcast(&self, msg: &Message) -> Result<(), TransportError> {
        self.udp.broadcast(msg, self.dport).await
    }

    async fn send_unicast(&self, addr: SocketAddr, msg: &Message) -> Result<(), TransportError> {
        send_unicast(addr, msg).await
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every send for assertions; destinations in
    /// `fail_unicast_to` report a transport error instead of succeeding,
    /// to exercise the batcher's reroute/extend-deadline paths.
    #[derive(Default)]
    pub struct MockTransport {
        pub broadcasts: Mutex<Vec<Message>>,
        pub unicasts: Mutex<Vec<(SocketAddr, Message)>>,
        pub fail_unicast_to: Mutex<HashSet<SocketAddr>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn broadcast(&self, msg: &Message) -> Result<(), TransportError> {
            self.broadcasts.lock().unwrap().push(msg.clone());
            Ok(())
        }

        async fn send_unicast(&self, addr: SocketAddr, msg: &Message) -> Result<(), TransportError> {
            if self.fail_unicast_to.lock().unwrap().contains(&addr) {
                return Err(TransportError::ConnectTimeout(std::time::Duration::from_secs(2)));
            }
            self.unicasts.lock().unwrap().push((addr, msg.clone()));
            Ok(())
        }
    }
}
