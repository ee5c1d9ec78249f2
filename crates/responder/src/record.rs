//! Record naming and challenge digest helpers

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Record types the TLD service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordType {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record the coordinator expects to see published
///
/// Lives for a single challenge cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    /// Fully qualified name to resolve
    pub fqdn: String,
    pub record_type: RecordType,
    /// Value the first answer must carry
    pub expected: String,
    /// Digest of the raw challenge value, TXT requests only
    pub digest: Option<String>,
}

impl ChallengeRequest {
    /// TXT request for a challenge value, carrying its digest as the expected value
    pub fn txt(node_id: &str, domain: &str, challenge_value: &str) -> Self {
        let digest = compute_challenge_digest(challenge_value);
        Self {
            fqdn: challenge_record_fqdn(node_id, domain),
            record_type: RecordType::Txt,
            expected: digest.clone(),
            digest: Some(digest),
        }
    }

    /// A request for the node's address record
    pub fn a(node_id: &str, domain: &str, ip: impl ToString) -> Self {
        Self {
            fqdn: node_record_fqdn(node_id, domain),
            record_type: RecordType::A,
            expected: ip.to_string(),
            digest: None,
        }
    }
}

/// Compute the DNS-01 TXT value for a raw challenge value
///
/// base64url (no padding) of the SHA-256 digest; always 43 characters.
pub fn compute_challenge_digest(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// `<node_id>.<domain>`
pub fn node_record_fqdn(node_id: &str, domain: &str) -> String {
    format!("{}.{}", node_id, domain)
}

/// `_acme-challenge.<node_id>.<domain>`
pub fn challenge_record_fqdn(node_id: &str, domain: &str) -> String {
    format!("{}.{}.{}", ACME_CHALLENGE_RECORD, node_id, domain)
}
