//! RSA member keypairs, PEM-encoded (spec.md §6 "Crypto formats").

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::CryptoError;

/// Key size used for freshly generated member identities. 2048 bits is
/// the common floor for RSA in 2020s-era deployments and leaves enough
/// headroom for max-length PSS salts and OAEP/SHA-256 wrapping of a
/// 32-byte symmetric key.
pub const KEY_BITS: usize = 2048;

pub fn generate_keypair() -> Result<(RsaPrivateKey, RsaPublicKey), CryptoError> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<String, CryptoError> {
    key.to_pkcs8_pem(Default::default())
        .map(|p| p.to_string())
        .map_err(|e| CryptoError::Pkcs8(e.to_string()))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::Pkcs8(e.to_string()))
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(Default::default())
        .map_err(|e| CryptoError::Pkcs8(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Pkcs8(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrip() {
        let (priv_key, pub_key) = generate_keypair().unwrap();
        let priv_pem = private_key_to_pem(&priv_key).unwrap();
        let pub_pem = public_key_to_pem(&pub_key).unwrap();

        let priv_back = private_key_from_pem(&priv_pem).unwrap();
        let pub_back = public_key_from_pem(&pub_pem).unwrap();

        assert_eq!(priv_key, priv_back);
        assert_eq!(pub_key, pub_back);
    }
}
