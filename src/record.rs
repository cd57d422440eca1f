//! Signed record schema, event kind numbers, tag names, and the security
//! bounds enforced at parse time across the whole crate.

use serde::{Deserialize, Serialize};

/// Kind numbers for the four record types this crate understands.
pub mod kind {
    pub const PROPOSAL: u32 = 5910;
    pub const VOTE: u32 = 6910;
    pub const RESULT: u32 = 7910;
    pub const CAPABILITY: u32 = 31990;
    /// Kind-3 follow list, read by social discovery's 2-hop expansion.
    pub const FOLLOW_LIST: u32 = 3;
}

/// Tag name constants (first element of each tag sequence).
pub mod tag {
    pub const D: &str = "d";
    pub const TYPE: &str = "type";
    pub const PARTICIPANT: &str = "p";
    pub const THRESHOLD: &str = "threshold";
    pub const QUORUM: &str = "quorum";
    pub const EXPIRES: &str = "expires";
    pub const ACTION: &str = "action";
    pub const WEIGHT: &str = "weight";
    pub const STAKE: &str = "stake";
    pub const EVENT: &str = "e";
    pub const VOTE: &str = "vote";
    pub const REASON: &str = "reason";
    pub const RANK: &str = "rank";
    pub const OUTCOME: &str = "outcome";
    pub const VOTES: &str = "votes";
    pub const PARTICIPANTS: &str = "participants";
    pub const KIND: &str = "k";
    pub const NIP: &str = "nip";
    pub const PRICING: &str = "pricing";
    pub const CAPACITY: &str = "capacity";
    pub const MODEL: &str = "model";
    pub const SKILLS: &str = "skills";
    pub const ILP_ADDRESS: &str = "ilp-address";
    pub const AGENT_TYPE: &str = "agent-type";
    pub const ILP: &str = "ilp";
}

/// Tag marker values (second-ish element disambiguating an `e` tag's role).
pub mod marker {
    pub const PROPOSAL: &str = "proposal";
    pub const VOTE: &str = "vote";
}

/// Numeric and string bounds enforced on parse.
pub mod limits {
    pub const PUBKEY_HEX_LEN: usize = 64;
    pub const PROPOSAL_ID_HEX_LEN: usize = 32;
    pub const MAX_PARTICIPANTS: usize = 1000;
    pub const MAX_WEIGHT_VALUE: f64 = 1_000_000_000.0;
    pub const MAX_ACTION_DATA_BYTES: usize = 102_400;
    pub const MAX_VOTE_REASON_CHARS: usize = 500;
    pub const MAX_RANK_ENTRIES: usize = 100;
}

/// An immutable, signed wire record as produced by the transport layer.
///
/// The transport is responsible for verifying `signature` over
/// `(author_pubkey, created_at, kind, tags, content)`; every parser in this
/// crate treats an unverified record as untrusted input and never consumes
/// a field before the transport has confirmed the signature (see
/// [`crate::transport::Signer::verify`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub id: String,
    pub author_pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub signature: String,
}

impl SignedRecord {
    /// First tag whose name matches `name`, if any.
    pub fn first_tag(&self, name: &str) -> Option<&Vec<String>> {
        self.tags.iter().find(|t| t.first().map(String::as_str) == Some(name))
    }

    /// All tags whose name matches `name`, in document order.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vec<String>> {
        self.tags.iter().filter(move |t| t.first().map(String::as_str) == Some(name))
    }
}

/// A lowercase 64-hex pubkey, validated on construction.
pub fn is_valid_pubkey(s: &str) -> bool {
    s.len() == limits::PUBKEY_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// A 32-hex proposal id, validated on construction.
pub fn is_valid_proposal_id(s: &str) -> bool {
    s.len() == limits::PROPOSAL_ID_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_validation_rejects_wrong_length_and_case() {
        let good = "a".repeat(64);
        assert!(is_valid_pubkey(&good));
        assert!(!is_valid_pubkey(&"A".repeat(64)));
        assert!(!is_valid_pubkey(&"a".repeat(63)));
    }

    #[test]
    fn first_tag_and_tags_named() {
        let record = SignedRecord {
            id: "id".into(),
            author_pubkey: "a".repeat(64),
            created_at: 0,
            kind: kind::PROPOSAL,
            tags: vec![
                vec!["p".into(), "x".into()],
                vec!["p".into(), "y".into()],
                vec!["d".into(), "abc".into()],
            ],
            content: String::new(),
            signature: "sig".into(),
        };
        assert_eq!(record.first_tag("d").unwrap()[1], "abc");
        assert_eq!(record.tags_named("p").count(), 2);
    }
}
