//! Node-level group orchestration (spec.md §4.I): the stateful half of
//! the overlay. The stateless crypto (sign/verify/wrap/unwrap, envelope
//! construction) lives in `labelmesh_crypto::group`; this module holds
//! the policy that needs the locally stored `Group.at` — deciding
//! whether to mint, adopt, or ignore an incoming invite.

use labelmesh_crypto::label::encrypted_label;
use labelmesh_crypto::{create_invite_envelope, unwrap_group_key, CryptoError, GroupKey, Invite, InviteEnvelope};
use rsa::RsaPrivateKey;

use crate::model::GroupState;

/// Apply a verified incoming invite to `group` (spec.md §4.I step 4).
/// Returns whether the group's key/`at` changed.
pub fn apply_incoming_invite(
    own_private: &RsaPrivateKey,
    own_name: &str,
    now: f64,
    group: &mut GroupState,
    invite: &Invite,
) -> Result<bool, CryptoError> {
    if group.at == 0.0 && invite.at == 0.0 {
        group.raw_key = Some(GroupKey::generate());
        group.at = now;
        return Ok(true);
    }
    if invite.at > group.at {
        if let Some(key) = unwrap_group_key(own_private, invite, own_name)? {
            group.raw_key = Some(key);
            group.at = invite.at;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Recompute the overlay label set after a key change (spec.md §4.I step
/// 5): every label in the group's registered cleartext set gets
/// re-namespaced as `group//label`.
pub fn refresh_encrypted_labels(group_name: &str, group: &mut GroupState) {
    group.encrypted_labels = group
        .labels
        .iter()
        .map(|label| encrypted_label(group_name, label))
        .collect();
}

/// Build this node's invite envelope wrapping the current group key for
/// every known member, or `None` if no key has been minted/adopted yet.
pub fn build_invite_envelope(
    signing_key: &RsaPrivateKey,
    now: f64,
    group: &GroupState,
) -> Result<Option<InviteEnvelope>, CryptoError> {
    let Some(key) = &group.raw_key else {
        return Ok(None);
    };
    create_invite_envelope(signing_key, now, key, &group.keys).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use labelmesh_crypto::keys::generate_keypair;
    use std::collections::HashMap;

    #[test]
    fn both_sides_at_zero_mints_fresh_key() {
        let (priv_key, _pub_key) = generate_keypair().unwrap();
        let mut group = GroupState::default();
        let invite = Invite { at: 0.0, invites: HashMap::new() };
        let changed = apply_incoming_invite(&priv_key, "alice", 100.0, &mut group, &invite).unwrap();
        assert!(changed);
        assert_eq!(group.at, 100.0);
        assert!(group.raw_key.is_some());
    }

    #[test]
    fn newer_invite_for_us_is_adopted() {
        let (alice_priv, alice_pub) = generate_keypair().unwrap();
        let mut group = GroupState { at: 5.0, raw_key: Some(GroupKey::generate()), ..Default::default() };
        let key = GroupKey::generate();
        let wrapped = labelmesh_crypto::sign::wrap(&alice_pub, &key.0).unwrap();
        let mut invites = HashMap::new();
        invites.insert(
            "alice".to_string(),
            base64::engine::general_purpose::STANDARD.encode(wrapped),
        );
        let invite = Invite { at: 10.0, invites };
        let changed = apply_incoming_invite(&alice_priv, "alice", 20.0, &mut group, &invite).unwrap();
        assert!(changed);
        assert_eq!(group.at, 10.0);
        assert_eq!(group.raw_key.unwrap().0, key.0);
    }

    #[test]
    fn stale_invite_is_ignored() {
        let (priv_key, _pub_key) = generate_keypair().unwrap();
        let existing_key = GroupKey::generate();
        let mut group = GroupState { at: 50.0, raw_key: Some(existing_key.clone()), ..Default::default() };
        let invite = Invite { at: 10.0, invites: HashMap::new() };
        let changed = apply_incoming_invite(&priv_key, "alice", 60.0, &mut group, &invite).unwrap();
        assert!(!changed);
        assert_eq!(group.at, 50.0);
        assert_eq!(group.raw_key.unwrap().0, existing_key.0);
    }

    #[test]
    fn refresh_recomputes_overlay_labels_from_registered_set() {
        let mut group = GroupState::default();
        group.labels.insert("weather".to_string());
        group.labels.insert("traffic".to_string());
        group.encrypted_labels.insert("g//stale".to_string());
        refresh_encrypted_labels("g", &mut group);
        assert!(!group.encrypted_labels.contains("g//stale"));
        assert!(group.encrypted_labels.contains("g//weather"));
        assert!(group.encrypted_labels.contains("g//traffic"));
    }
}
