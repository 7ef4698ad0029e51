//! UDP broadcast send/receive (spec.md §4.C).

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use labelmesh_core::{Message, BROADCAST_CAPACITY};

use crate::error::TransportError;
use crate::iface;

/// Max datagram we'll accept off the wire; generous relative to the
/// 512-byte broadcast soft cap so a slightly oversized unicast-origin
/// datagram (if one ever arrived over UDP) isn't truncated.
const MAX_DGRAM: usize = 8 * 1024;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: std::collections::HashSet<Ipv4Addr>,
}

impl UdpTransport {
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket: Arc::new(socket),
            local: iface::local_ipv4_addrs(),
        })
    }

    /// Broadcast `msg` to every local interface's broadcast address on
    /// `dport`. Logs and continues past a per-interface send failure —
    /// one bad interface must not stop delivery on the rest.
    pub async fn broadcast(&self, msg: &Message, dport: u16) -> Result<(), TransportError> {
        let bytes = msg.encode();
        if bytes.len() > BROADCAST_CAPACITY {
            warn!(len = bytes.len(), "broadcasting datagram over soft cap");
        }
        let addrs = iface::broadcast_addrs()?;
        let mut sent_any = false;
        for addr in addrs {
            let dst = SocketAddr::new(addr.into(), dport);
            match self.socket.send_to(&bytes, dst).await {
                Ok(_) => sent_any = true,
                Err(e) => warn!(%dst, error = %e, "broadcast send failed on interface"),
            }
        }
        if !sent_any {
            return Err(TransportError::NoInterfaces);
        }
        Ok(())
    }

    /// Receive the next datagram that doesn't look like our own
    /// broadcast or loopback traffic, decoding it as a wire message.
    /// Malformed or self-originated datagrams are skipped silently
    /// (caller gets the next valid one), matching spec.md §4.C.
    pub async fn recv(&self) -> Result<(SocketAddr, Message), TransportError> {
        let mut buf = vec![0u8; MAX_DGRAM];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            if self.is_self_or_loopback(src) {
                continue;
            }
            match Message::decode(&buf[..len]) {
                Ok(msg) => return Ok((src, msg)),
                Err(e) => {
                    debug!(%src, error = %e, "dropping malformed datagram");
                    continue;
                }
            }
        }
    }

    fn is_self_or_loopback(&self, addr: SocketAddr) -> bool {
        match addr.ip() {
            std::net::IpAddr::V4(v4) => {
                v4.is_loopback() || v4.is_unspecified() || self.local.contains(&v4)
            }
            std::net::IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        }
    }
}
