//! Group data confidentiality: a versioned, authenticated symmetric
//! envelope (spec.md §4.I — "Fernet-compatible... or equivalent AEAD").
//!
//! Token layout: `[version: u8][timestamp: u64 BE][nonce: 12 bytes][AES-256-GCM ciphertext+tag]`,
//! base64-encoded. Built the way
//! `wichain-backend/src-tauri/src/crypto_utils.rs` builds its
//! nonce-prefixed AEAD envelope, extended with a version byte and
//! timestamp so it carries the same information a real Fernet token
//! does (useful for future TTL-based rejection, not currently enforced).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::error::CryptoError;

const TOKEN_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

/// 32-byte symmetric group key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GroupKey(pub [u8; 32]);

impl GroupKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Encrypt `plaintext` under `key`, stamping `now` (seconds since epoch,
/// truncated to whole seconds) into the token.
pub fn encrypt(key: &GroupKey, now: f64, plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(&key.0).expect("32-byte key");
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::DecryptFailed)?;

    let mut out = Vec::with_capacity(1 + 8 + NONCE_LEN + ciphertext.len());
    out.push(TOKEN_VERSION);
    out.extend_from_slice(&(now as u64).to_be_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Decrypt a token produced by [`encrypt`]. Any failure (bad base64, bad
/// version, bad tag) is a single `DecryptFailed`/`UnsupportedTokenVersion`
/// — callers treat both as "retry later" per spec.md §7.
pub fn decrypt(key: &GroupKey, token: &str) -> Result<Vec<u8>, CryptoError> {
    let raw = URL_SAFE_NO_PAD.decode(token)?;
    if raw.len() < 1 + 8 + NONCE_LEN {
        return Err(CryptoError::Malformed("token too short".into()));
    }
    let version = raw[0];
    if version != TOKEN_VERSION {
        return Err(CryptoError::UnsupportedTokenVersion(version));
    }
    let nonce_bytes = &raw[9..9 + NONCE_LEN];
    let ciphertext = &raw[9 + NONCE_LEN..];

    let cipher = Aes256Gcm::new_from_slice(&key.0).expect("32-byte key");
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = GroupKey::generate();
        let token = encrypt(&key, 1000.0, b"hello group").unwrap();
        let plain = decrypt(&key, &token).unwrap();
        assert_eq!(plain, b"hello group");
    }

    #[test]
    fn wrong_key_fails() {
        let key = GroupKey::generate();
        let other = GroupKey::generate();
        let token = encrypt(&key, 1000.0, b"secret").unwrap();
        assert!(decrypt(&other, &token).is_err());
    }

    #[test]
    fn tampered_token_fails() {
        let key = GroupKey::generate();
        let mut token = encrypt(&key, 1000.0, b"secret").unwrap();
        token.push('a');
        assert!(decrypt(&key, &token).is_err());
    }
}
