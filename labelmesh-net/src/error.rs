use thiserror::Error;

/// Transport-transient errors (spec.md §7): the batcher reroutes or
/// extends deadlines on these, they never propagate to client callers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("read timed out after {0:?}")]
    DataTimeout(std::time::Duration),

    #[error("no local IPv4 interfaces found to broadcast on")]
    NoInterfaces,
}
