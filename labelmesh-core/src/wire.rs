//! Compact textual wire codec (spec.md §4.A).
//!
//! A message is `{v, i[]}`. Each item carries a one-character
//! discriminator (`t`) and single-letter field keys to keep datagrams
//! small. Serialized as JSON — textual, and with the short keys below it
//! stays well under the 512-byte broadcast soft cap for the item counts
//! this protocol actually batches.

use serde::{Deserialize, Serialize};

use crate::constants::PROTOCOL_VERSION;
use crate::error::CodecError;

/// A published item inside a message. See spec.md §4.A for the field
/// table this mirrors one-to-one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Item {
    #[serde(rename = "p")]
    Peer {
        /// Absolute EOL, seconds since epoch.
        e: f64,
    },
    #[serde(rename = "a")]
    Advert {
        c: String,
        l: Vec<String>,
        s: f64,
        p: f64,
        e: f64,
    },
    #[serde(rename = "g")]
    Get {
        c: String,
        l: String,
        a: f64,
        p: f64,
        e: f64,
    },
    #[serde(rename = "s")]
    Set {
        l: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        a: f64,
        /// `(ttp, client)` forwarding destinations.
        c: Vec<(f64, String)>,
    },
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Peer { .. } => "p",
            Item::Advert { .. } => "a",
            Item::Get { .. } => "g",
            Item::Set { .. } => "s",
        }
    }
}

/// A full wire message: a version tag plus a batch of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "i")]
    pub items: Vec<Item>,
}

impl Message {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            items,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Encode to the compact textual wire form.
    pub fn encode(&self) -> Vec<u8> {
        // `serde_json::to_vec` never fails for these plain-data types.
        serde_json::to_vec(self).expect("message is always serializable")
    }

    /// Decode from the wire form, rejecting any version other than the
    /// implementation's constant (spec.md §4.A).
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let msg: Message = serde_json::from_slice(bytes)?;
        if msg.version != PROTOCOL_VERSION {
            return Err(CodecError::VersionMismatch { got: msg.version });
        }
        Ok(msg)
    }

    pub fn encoded_len(&self) -> usize {
        self.encode().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_items() -> Vec<Item> {
        vec![
            Item::Peer { e: 123.0 },
            Item::Advert {
                c: "alice".into(),
                l: vec!["weather".into(), "traffic".into()],
                s: 9000.0,
                p: 1.5,
                e: 999.0,
            },
            Item::Get {
                c: "bob".into(),
                l: "weather".into(),
                a: 10.0,
                p: 1.0,
                e: 50.0,
            },
            Item::Set {
                l: "weather".into(),
                d: Some("sunny".into()),
                a: 42.0,
                c: vec![(1.0, "bob".into())],
            },
        ]
    }

    #[test]
    fn roundtrip_every_item_kind() {
        let msg = Message::new(sample_items());
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn set_with_null_data_roundtrips() {
        let msg = Message::new(vec![Item::Set {
            l: "x".into(),
            d: None,
            a: 1.0,
            c: vec![],
        }]);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn version_gate_rejects_other_versions() {
        let bad = serde_json::json!({
            "v": "0.1",
            "i": []
        });
        let bytes = serde_json::to_vec(&bad).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(CodecError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(Message::decode(b"not json").is_err());
    }

    #[test]
    fn empty_message_is_small() {
        assert!(Message::empty().encoded_len() < 64);
    }
}
