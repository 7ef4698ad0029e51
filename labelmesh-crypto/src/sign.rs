//! RSA-PSS/SHA-256 signatures with maximum salt length (spec.md §4.I
//! step 3), and RSA-OAEP/SHA-256 key wrapping (step 3's `invites[member]`).

use rand::rngs::OsRng;
use rsa::pss::{Signature as PssSignature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

/// SHA-256 digest length in bytes.
const SHA256_OUTPUT_LEN: usize = 32;

/// Maximum PSS salt length for this key size: `k - hLen - 2` per RFC 8017.
fn max_salt_len(key: &RsaPrivateKey) -> usize {
    key.size().saturating_sub(SHA256_OUTPUT_LEN + 2)
}

/// RSA-PSS/SHA-256 sign with the maximum salt length the key supports.
pub fn sign(private: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    let salt_len = max_salt_len(private);
    let signing_key = SigningKey::<Sha256>::new_with_salt_len(private.clone(), salt_len);
    let sig = signing_key.sign_with_rng(&mut OsRng, message);
    sig.to_bytes().to_vec()
}

/// Verify an RSA-PSS/SHA-256 signature. Salt length is recovered from the
/// signature itself by the PSS verifier, so the verifier doesn't need to
/// know the signer's chosen length.
pub fn verify(public: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
    let sig = match PssSignature::try_from(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    verifying_key.verify(message, &sig).is_ok()
}

/// RSA-OAEP/SHA-256 wrap of a symmetric key (or any short payload).
pub fn wrap(public: &RsaPublicKey, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let padding = Oaep::new::<Sha256>();
    Ok(public.encrypt(&mut OsRng, padding, payload)?)
}

/// RSA-OAEP/SHA-256 unwrap.
pub fn unwrap(private: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let padding = Oaep::new::<Sha256>();
    Ok(private.decrypt(padding, ciphertext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn sign_and_verify_roundtrip() {
        let (priv_key, pub_key) = generate_keypair().unwrap();
        let msg = b"group invite payload";
        let sig = sign(&priv_key, msg);
        assert!(verify(&pub_key, msg, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let (priv_key, pub_key) = generate_keypair().unwrap();
        let sig = sign(&priv_key, b"original");
        assert!(!verify(&pub_key, b"tampered", &sig));
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let (priv_key, pub_key) = generate_keypair().unwrap();
        let key_bytes = [7u8; 32];
        let wrapped = wrap(&pub_key, &key_bytes).unwrap();
        let unwrapped = unwrap(&priv_key, &wrapped).unwrap();
        assert_eq!(unwrapped, key_bytes);
    }
}
