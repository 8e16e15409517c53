//! The shard record type and shard path layout.
//!
//! Every accepted input line becomes one JSON object on one line of a shard
//! file. The shard is chosen by the first four hex characters of the email
//! hash: `SHARD_ROOT/<hh>/<hhhh>.jsonl` where `hh` is the first two.
//! Field declaration order below fixes the JSON key order.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classify::HashType;
use crate::error::Result;

/// Number of hex characters in a shard prefix.
pub const PREFIX_LEN: usize = 4;

/// One record as emitted into a shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    /// 64-hex HMAC-SHA-256 of the normalized email.
    pub email_hash: String,
    /// The credential, verbatim (may itself be a hash).
    pub password: String,
    pub is_hash: bool,
    pub hash_type: HashType,
    /// Normalized email, or empty in scrub mode.
    pub email: String,
    /// Absolute path of the input file the record came from.
    pub source: String,
}

impl ShardRecord {
    /// The four-hex-character shard prefix of this record.
    pub fn shard_prefix(&self) -> &str {
        &self.email_hash[..PREFIX_LEN]
    }

    /// Encode as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Relative path of the shard file for a hash prefix: `hh/hhhh.jsonl`.
pub fn shard_rel_path(prefix: &str) -> PathBuf {
    PathBuf::from(&prefix[..2]).join(format!("{prefix}.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShardRecord {
        ShardRecord {
            email_hash: "abcd".to_string() + &"0".repeat(60),
            password: "hunter2".to_string(),
            is_hash: false,
            hash_type: HashType::Plaintext,
            email: "alice@example.com".to_string(),
            source: "/in/a.txt".to_string(),
        }
    }

    #[test]
    fn test_json_key_order_stable() {
        let json = sample().to_json_line().unwrap();
        let expected = format!(
            "{{\"email_hash\":\"abcd{zeros}\",\"password\":\"hunter2\",\"is_hash\":false,\
             \"hash_type\":\"plaintext\",\"email\":\"alice@example.com\",\"source\":\"/in/a.txt\"}}",
            zeros = "0".repeat(60)
        );
        assert_eq!(json, expected);
    }

    #[test]
    fn test_json_round_trip() {
        let record = sample();
        let json = record.to_json_line().unwrap();
        let back: ShardRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_shard_prefix() {
        assert_eq!(sample().shard_prefix(), "abcd");
    }

    #[test]
    fn test_shard_rel_path() {
        assert_eq!(shard_rel_path("abcd"), PathBuf::from("ab/abcd.jsonl"));
        assert_eq!(shard_rel_path("00ff"), PathBuf::from("00/00ff.jsonl"));
    }

    #[test]
    fn test_hash_type_serialized_as_wire_name() {
        let mut record = sample();
        record.hash_type = HashType::Bcrypt;
        record.is_hash = true;
        let json = record.to_json_line().unwrap();
        assert!(json.contains("\"hash_type\":\"bcrypt\""));
        assert!(json.contains("\"is_hash\":true"));
    }
}
