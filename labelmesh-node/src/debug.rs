//! Debug status endpoint (spec.md §1: explicitly thin, out of the
//! protocol core). A bare HTTP/1.0-ish responder: read nothing, write
//! one JSON body, close. Good enough for `curl localhost:PORT`.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::warn;

use crate::node::NodeHandle;

/// Serve `GET /` with the current [`crate::node::DebugStatus`] as JSON,
/// forever, on `port`. Spawned as a best-effort side task — a bind
/// failure is logged and the task simply exits rather than taking the
/// node down with it.
pub async fn serve_debug(port: u16, handle: NodeHandle) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            warn!(%addr, error = %err, "debug endpoint failed to bind");
            return;
        }
    };
    loop {
        let (mut stream, _src) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "debug endpoint accept failed");
                continue;
            }
        };
        let handle = handle.clone();
        tokio::spawn(async move {
            let body = match handle.status().await {
                Ok(status) => serde_json::to_string(&status).unwrap_or_else(|_| "{}".to_string()),
                Err(err) => format!("{{\"error\":\"{err}\"}}"),
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}
