//! TCP unicast send/receive (spec.md §4.C). One message per connection:
//! the sender writes and closes, the receiver reads to EOF.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use labelmesh_core::{Message, DATA_TIMEOUT, TCP_TIMEOUT};

use crate::error::TransportError;

/// Open a connection, write `msg`, drain, and close. Connect and write
/// each carry their own 2-second timeout.
pub async fn send_unicast(addr: SocketAddr, msg: &Message) -> Result<(), TransportError> {
    let mut stream = timeout(TCP_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::ConnectTimeout(TCP_TIMEOUT))??;

    let bytes = msg.encode();
    timeout(TCP_TIMEOUT, async {
        stream.write_all(&bytes).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| TransportError::DataTimeout(TCP_TIMEOUT))??;

    Ok(())
}

/// A bound TCP listener that decodes one message per accepted connection.
pub struct TcpReceiver {
    listener: TcpListener,
}

impl TcpReceiver {
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept the next connection, read it to EOF (or `DATA_TIMEOUT`,
    /// whichever comes first) and decode the payload. Connection-level
    /// and decode failures are logged and skipped; caller gets the next
    /// successfully decoded message.
    pub async fn recv(&self) -> Result<(SocketAddr, Message), TransportError> {
        loop {
            let (mut stream, src) = self.listener.accept().await?;
            let mut buf = Vec::new();
            let read = timeout(DATA_TIMEOUT, stream.read_to_end(&mut buf)).await;
            let Ok(read) = read else {
                debug!(%src, "tcp read timed out");
                continue;
            };
            if let Err(e) = read {
                debug!(%src, error = %e, "tcp read failed");
                continue;
            }
            match Message::decode(&buf) {
                Ok(msg) => return Ok((src, msg)),
                Err(e) => {
                    debug!(%src, error = %e, "dropping malformed tcp payload");
                    continue;
                }
            }
        }
    }
}
