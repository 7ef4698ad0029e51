use thiserror::Error;

/// Cryptographic errors (spec.md §7): the offending invite or data is
/// skipped, the caller loops and retries — these never propagate as a
/// hard failure.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bad signature")]
    BadSignature,

    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("rsa pkcs8 key error: {0}")]
    Pkcs8(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("symmetric decrypt failed")]
    DecryptFailed,

    #[error("unsupported token version {0}")]
    UnsupportedTokenVersion(u8),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
