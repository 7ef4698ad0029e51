use thiserror::Error;

use labelmesh_core::CodecError;
use labelmesh_crypto::CryptoError;
use labelmesh_net::TransportError;

/// Top-level node error taxonomy (spec.md §7). Only the `Precondition`
/// and `Fatal` variants are meant to reach a caller; transport and
/// protocol errors are handled internally (requeue / drop-and-log).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("node actor is no longer running")]
    ActorGone,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for NodeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        NodeError::ActorGone
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for NodeError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        NodeError::ActorGone
    }
}
