use thiserror::Error;

/// Errors raised while decoding a wire message. Malformed records are
/// dropped by the caller (spec.md §4.A); this type exists so the drop can
/// be logged with a reason.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported protocol version {got:?}, expected \"0.2\"")]
    VersionMismatch { got: String },
}
