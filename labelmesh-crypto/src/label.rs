//! Label namespacing for the group overlay (spec.md §4.I steps 1 and 5).
//!
//! Deliberately namespacing only: labels stay observable on the wire,
//! only the `set` payload under them is encrypted. The spec carries this
//! forward from the reference's commented-out "stable label encryption"
//! — see spec.md §4.I's open issue. This module is the seam where a
//! future label-encryption scheme would plug in.

/// Label a client publishes invites under: `group/client`.
pub fn invite_label(group: &str, client: &str) -> String {
    format!("{group}/{client}")
}

/// Label group data is published under once namespaced: `group//label`.
pub fn encrypted_label(group: &str, label: &str) -> String {
    format!("{group}//{label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_label_format() {
        assert_eq!(invite_label("g", "alice"), "g/alice");
    }

    #[test]
    fn encrypted_label_format() {
        assert_eq!(encrypted_label("g", "weather"), "g//weather");
    }
}
