//! Credential classification by hash family.
//!
//! Breach dumps mix plaintext passwords with already-hashed credentials.
//! The classifier recognizes the common password-hash families by shape so
//! that downstream consumers can tell a crackable plaintext from an MD5 from
//! a bcrypt without re-inspecting the string.
//!
//! First match wins, in the order of [`classify`]; anything unrecognized is
//! plaintext. The classifier is total over non-empty strings and pure.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static BCRYPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$2[aby]\$\d{2}\$[A-Za-z0-9./]{53}$").expect("bcrypt regex should compile")
});

static ARGON2_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$argon2(i|d|id)\$v=\d+\$.*\$.*\$.*$").expect("argon2 regex should compile")
});

static MD5_CRYPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$1\$[^$]+\$[A-Za-z0-9./]+$").expect("md5-crypt regex should compile")
});

static SHA256_CRYPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$5\$[^$]+\$[A-Za-z0-9./]+$").expect("sha256-crypt regex should compile")
});

static SHA512_CRYPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$6\$[^$]+\$[A-Za-z0-9./]+$").expect("sha512-crypt regex should compile")
});

static SSHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{SSHA\}[A-Za-z0-9+/=]+$").expect("ssha regex should compile"));

static SHA1_B64_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{SHA\}[A-Za-z0-9+/=]+$").expect("sha1-base64 regex should compile")
});

/// Recognized credential families.
///
/// Serialized as the wire names used in shard records (`plaintext`,
/// `md5-hex`, `bcrypt`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashType {
    #[serde(rename = "plaintext")]
    Plaintext,
    #[serde(rename = "md5-hex")]
    Md5Hex,
    #[serde(rename = "sha1-hex")]
    Sha1Hex,
    #[serde(rename = "sha256-hex")]
    Sha256Hex,
    #[serde(rename = "sha512-hex")]
    Sha512Hex,
    #[serde(rename = "bcrypt")]
    Bcrypt,
    #[serde(rename = "argon2")]
    Argon2,
    #[serde(rename = "md5-crypt")]
    Md5Crypt,
    #[serde(rename = "sha256-crypt")]
    Sha256Crypt,
    #[serde(rename = "sha512-crypt")]
    Sha512Crypt,
    #[serde(rename = "ssha")]
    Ssha,
    #[serde(rename = "sha1-base64")]
    Sha1Base64,
}

impl HashType {
    /// Whether this family is a hash (everything except plaintext).
    pub fn is_hash(self) -> bool {
        self != Self::Plaintext
    }

    /// The wire name, as serialized into shard records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::Md5Hex => "md5-hex",
            Self::Sha1Hex => "sha1-hex",
            Self::Sha256Hex => "sha256-hex",
            Self::Sha512Hex => "sha512-hex",
            Self::Bcrypt => "bcrypt",
            Self::Argon2 => "argon2",
            Self::Md5Crypt => "md5-crypt",
            Self::Sha256Crypt => "sha256-crypt",
            Self::Sha512Crypt => "sha512-crypt",
            Self::Ssha => "ssha",
            Self::Sha1Base64 => "sha1-base64",
        }
    }
}

impl std::fmt::Display for HashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Classify a trimmed credential string.
pub fn classify(credential: &str) -> HashType {
    // Modular-crypt and LDAP-style prefixes first; they are cheap to gate on
    // the first byte before touching any regex.
    if credential.starts_with('$') {
        if BCRYPT_RE.is_match(credential) {
            return HashType::Bcrypt;
        }
        if ARGON2_RE.is_match(credential) {
            return HashType::Argon2;
        }
        if MD5_CRYPT_RE.is_match(credential) {
            return HashType::Md5Crypt;
        }
        if SHA256_CRYPT_RE.is_match(credential) {
            return HashType::Sha256Crypt;
        }
        if SHA512_CRYPT_RE.is_match(credential) {
            return HashType::Sha512Crypt;
        }
    } else if credential.starts_with('{') {
        if SSHA_RE.is_match(credential) {
            return HashType::Ssha;
        }
        if SHA1_B64_RE.is_match(credential) {
            return HashType::Sha1Base64;
        }
    }

    match credential.len() {
        32 if is_hex_of_len(credential, 32) => HashType::Md5Hex,
        40 if is_hex_of_len(credential, 40) => HashType::Sha1Hex,
        64 if is_hex_of_len(credential, 64) => HashType::Sha256Hex,
        128 if is_hex_of_len(credential, 128) => HashType::Sha512Hex,
        _ => HashType::Plaintext,
    }
}
