//! Group confidentiality overlay primitives (spec.md §4.I): RSA-PSS
//! signatures, RSA-OAEP key wrapping, a Fernet-equivalent symmetric
//! envelope, invite-envelope plumbing, and label namespacing.

pub mod error;
pub mod group;
pub mod keys;
pub mod label;
pub mod sign;
pub mod symmetric;

pub use error::CryptoError;
pub use group::{create_invite_envelope, open_invite_envelope, unwrap_group_key, Invite, InviteEnvelope};
pub use keys::{generate_keypair, private_key_from_pem, private_key_to_pem, public_key_from_pem, public_key_to_pem};
pub use symmetric::GroupKey;
