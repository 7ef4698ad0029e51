//! Transport: UDP broadcast discovery and TCP unicast, plus the interface
//! enumeration the two broadcast flows need (spec.md §4.C).

pub mod error;
pub mod iface;
pub mod tcp;
pub mod udp;

pub use error::TransportError;
pub use tcp::{send_unicast, TcpReceiver};
pub use udp::UdpTransport;

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::wire::{Item, Message};

    #[tokio::test]
    async fn udp_roundtrip_between_two_sockets() {
        // Bind two sockets on ephemeral ports and send directly
        // (loopback, so the usual self-filter would apply to broadcast
        // traffic only — here we exercise plain send/recv plumbing).
        let a = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let msg = Message::new(vec![Item::Peer { e: 1.0 }]);
        a.send_to(&msg.encode(), b_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _src) = b.recv_from(&mut buf).await.unwrap();
        let decoded = Message::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn tcp_send_then_receive() {
        let receiver = TcpReceiver::bind(0).await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let msg = Message::new(vec![Item::Peer { e: 2.0 }]);

        let send_fut = send_unicast(addr, &msg);
        let recv_fut = receiver.recv();

        let (send_res, recv_res) = tokio::join!(send_fut, recv_fut);
        send_res.unwrap();
        let (_src, decoded) = recv_res.unwrap();
        assert_eq!(decoded, msg);
    }
}
