//! Invite envelope construction/consumption (spec.md §4.I steps 3-4).
//!
//! This module only holds the stateless cryptographic primitives — sign,
//! wrap, verify, unwrap. The "mint a fresh key if both sides are at
//! zero" / "accept only if incoming `at` is newer" policy is node state
//! (it needs the locally stored `Group.at`), and lives in
//! `labelmesh-node`.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::sign::{sign, unwrap, verify, wrap};
use crate::symmetric::GroupKey;

/// The signed payload inside an invite envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub at: f64,
    /// member client name -> base64(RSA-OAEP(group key)) wrapped for them.
    pub invites: HashMap<String, String>,
}

/// What actually gets published to `group + "/" + own_client"` (spec.md
/// §4.I step 3): `{d: base64(inner), s: base64(signature(inner))}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteEnvelope {
    pub d: String,
    pub s: String,
}

/// Build and sign an invite envelope wrapping `group_key` for every
/// member in `member_pubkeys`.
pub fn create_invite_envelope(
    signing_key: &RsaPrivateKey,
    at: f64,
    group_key: &GroupKey,
    member_pubkeys: &HashMap<String, RsaPublicKey>,
) -> Result<InviteEnvelope, CryptoError> {
    let mut invites = HashMap::with_capacity(member_pubkeys.len());
    for (member, pubkey) in member_pubkeys {
        let wrapped = wrap(pubkey, &group_key.0)?;
        invites.insert(member.clone(), STANDARD.encode(wrapped));
    }
    let inner = Invite { at, invites };
    let inner_bytes = serde_json::to_vec(&inner)?;
    let sig = sign(signing_key, &inner_bytes);
    Ok(InviteEnvelope {
        d: STANDARD.encode(inner_bytes),
        s: STANDARD.encode(sig),
    })
}

/// Verify and parse an invite envelope published by `peer_public`.
pub fn open_invite_envelope(
    envelope: &InviteEnvelope,
    peer_public: &RsaPublicKey,
) -> Result<Invite, CryptoError> {
    let inner_bytes = STANDARD.decode(&envelope.d)?;
    let sig_bytes = STANDARD.decode(&envelope.s)?;
    if !verify(peer_public, &inner_bytes, &sig_bytes) {
        return Err(CryptoError::BadSignature);
    }
    Ok(serde_json::from_slice(&inner_bytes)?)
}

/// Unwrap the group key meant for `own_name`, if the invite contains one.
pub fn unwrap_group_key(
    own_private: &RsaPrivateKey,
    invite: &Invite,
    own_name: &str,
) -> Result<Option<GroupKey>, CryptoError> {
    let Some(b64) = invite.invites.get(own_name) else {
        return Ok(None);
    };
    let wrapped = STANDARD.decode(b64)?;
    let bytes = unwrap(own_private, &wrapped)?;
    if bytes.len() != 32 {
        return Err(CryptoError::Malformed(format!(
            "unwrapped group key has {} bytes, expected 32",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(Some(GroupKey(arr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn full_invite_roundtrip() {
        let (alice_priv, alice_pub) = generate_keypair().unwrap();
        let (_bob_priv, bob_pub) = generate_keypair().unwrap();
        let key = GroupKey::generate();

        let mut members = HashMap::new();
        members.insert("alice".to_string(), alice_pub.clone());
        members.insert("bob".to_string(), bob_pub);

        let envelope = create_invite_envelope(&alice_priv, 42.0, &key, &members).unwrap();
        let invite = open_invite_envelope(&envelope, &alice_pub).unwrap();
        assert_eq!(invite.at, 42.0);

        let unwrapped = unwrap_group_key(&alice_priv, &invite, "alice").unwrap().unwrap();
        assert_eq!(unwrapped.0, key.0);
    }

    #[test]
    fn unknown_member_gets_none() {
        let (alice_priv, alice_pub) = generate_keypair().unwrap();
        let key = GroupKey::generate();
        let members = HashMap::new();
        let envelope = create_invite_envelope(&alice_priv, 1.0, &key, &members).unwrap();
        let invite = open_invite_envelope(&envelope, &alice_pub).unwrap();
        assert!(unwrap_group_key(&alice_priv, &invite, "carol").unwrap().is_none());
    }

    #[test]
    fn wrong_signer_rejected() {
        let (alice_priv, _alice_pub) = generate_keypair().unwrap();
        let (_eve_priv, eve_pub) = generate_keypair().unwrap();
        let key = GroupKey::generate();
        let envelope = create_invite_envelope(&alice_priv, 1.0, &key, &HashMap::new()).unwrap();
        assert!(open_invite_envelope(&envelope, &eve_pub).is_err());
    }
}
