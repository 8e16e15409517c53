//! Email canonicalization and keyed hashing.
//!
//! Emails from breach dumps arrive in wildly inconsistent shapes: mixed case,
//! leading junk from botched CSV exports, `+tag` aliases. Canonicalization
//! collapses those variants so that one person's address always hashes to the
//! same shard, and the keyed hash keeps the raw address out of the store.
//!
//! # Normalization
//!
//! Applied in order over the raw email substring:
//! 1. Trim ASCII whitespace.
//! 2. Lowercase (ASCII).
//! 3. Strip the leading run of non-alphanumeric characters.
//! 4. Drop everything in the local part from the first `+` onward.
//! 5. Reject any result not containing `@`.
//!
//! # Hashing
//!
//! HMAC-SHA-256 under a process-wide 32-byte key, emitted as 64 lowercase
//! hex characters. The key is identical across a dataset so that the lookup
//! service can recompute the hash for queries.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// The 32-byte HMAC key under which emails are hashed.
///
/// Parsed once at startup from a 64-hex-character string; anything else is a
/// fatal configuration error.
#[derive(Clone)]
pub struct HashKey([u8; KEY_LEN]);

impl HashKey {
    /// Parse a key from its 64-hex-character representation.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        if trimmed.len() != KEY_LEN * 2 {
            return Err(Error::Config(format!(
                "EMAIL_HASH_KEY must be {} hex characters ({} bytes), got {} characters",
                KEY_LEN * 2,
                KEY_LEN,
                trimmed.len()
            )));
        }
        let bytes = hex::decode(trimmed)
            .map_err(|e| Error::Config(format!("EMAIL_HASH_KEY is not valid hex: {e}")))?;
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Never print key material.
impl std::fmt::Debug for HashKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashKey([redacted; {KEY_LEN} bytes])")
    }
}

/// Canonicalize a raw email substring.
///
/// Returns `None` when the input does not canonicalize to something
/// containing an `@` (the caller counts these as no-email skips).
pub fn normalize_email(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    let stripped = lowered.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

    let normalized = match stripped.find('@') {
        // After stripping, the string starts alphanumeric, so any `@` is at
        // position > 0 and splits a non-empty local part from the domain.
        Some(at) => {
            let local = &stripped[..at];
            let domain = &stripped[at + 1..];
            let local = match local.split_once('+') {
                Some((head, _tag)) => head,
                None => local,
            };
            format!("{local}@{domain}")
        }
        None => return None,
    };

    normalized.contains('@').then_some(normalized)
}

/// Keyed email hasher.
///
/// Pure: no I/O, one MAC state per call.
#[derive(Clone)]
pub struct EmailHasher {
    key: HashKey,
}

impl EmailHasher {
    pub fn new(key: HashKey) -> Self {
        Self { key }
    }

    /// HMAC-SHA-256 of the normalized email, as 64 lowercase hex characters.
    pub fn hash_hex(&self, email_norm: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(email_norm.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_key() -> HashKey {
        HashKey::from_hex(&"0".repeat(64)).unwrap()
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    #[test]
    fn test_normalize_plain() {
        assert_eq!(
            normalize_email("john@example.com").as_deref(),
            Some("john@example.com")
        );
    }

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(
            normalize_email("  John@Example.COM  ").as_deref(),
            Some("john@example.com")
        );
    }

    #[test]
    fn test_normalize_leading_garbage() {
        assert_eq!(
            normalize_email("~~!john@example.com").as_deref(),
            Some("john@example.com")
        );
    }

    #[test]
    fn test_normalize_plus_tag() {
        assert_eq!(
            normalize_email("john+promo@example.com").as_deref(),
            Some("john@example.com")
        );
    }

    #[test]
    fn test_normalize_combined_variants() {
        // The canonical example: every variant collapses to the same address.
        assert_eq!(
            normalize_email(" ~John+promo@Example.COM").as_deref(),
            Some("john@example.com")
        );
    }

    #[test]
    fn test_normalize_plus_in_domain_untouched() {
        // Only the local part is stripped at `+`.
        assert_eq!(
            normalize_email("a@ex+ample.com").as_deref(),
            Some("a@ex+ample.com")
        );
    }

    #[test]
    fn test_normalize_rejects_no_at() {
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email(""), None);
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn test_normalize_rejects_garbage_swallowing_at() {
        // Leading non-alphanumerics include the `@` itself here, so the run
        // strip leaves no `@` behind.
        assert_eq!(normalize_email("~@example.com"), None);
    }

    // =========================================================================
    // Key parsing
    // =========================================================================

    #[test]
    fn test_key_valid() {
        let key = HashKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_LEN);
        assert_eq!(key.as_bytes()[0], 0xab);
    }

    #[test]
    fn test_key_trims_whitespace() {
        let hex = format!("  {}\n", "0".repeat(64));
        assert!(HashKey::from_hex(&hex).is_ok());
    }

    #[test]
    fn test_key_wrong_length() {
        assert!(HashKey::from_hex("abcd").is_err());
        assert!(HashKey::from_hex(&"0".repeat(63)).is_err());
        assert!(HashKey::from_hex(&"0".repeat(65)).is_err());
    }

    #[test]
    fn test_key_not_hex() {
        let err = HashKey::from_hex(&"g".repeat(64)).unwrap_err();
        assert!(err.to_string().contains("not valid hex"));
    }

    #[test]
    fn test_key_debug_redacted() {
        let key = zero_key();
        let debug = format!("{key:?}");
        assert!(!debug.contains("000000"));
        assert!(debug.contains("redacted"));
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    #[test]
    fn test_hash_shape() {
        let hasher = EmailHasher::new(zero_key());
        let hash = hasher.hash_hex("john@example.com");
        assert_eq!(hash.len(), 64);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(hash, hash.to_lowercase());
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = EmailHasher::new(zero_key());
        assert_eq!(
            hasher.hash_hex("john@example.com"),
            hasher.hash_hex("john@example.com")
        );
    }

    #[test]
    fn test_hash_invariant_under_normalization_variants() {
        let hasher = EmailHasher::new(zero_key());
        let canonical = hasher.hash_hex(&normalize_email("john@example.com").unwrap());
        for variant in [
            " ~John+promo@Example.COM",
            "JOHN@EXAMPLE.COM",
            "!!!john+a+b@example.com",
            "  john@example.com  ",
        ] {
            let norm = normalize_email(variant).unwrap();
            assert_eq!(hasher.hash_hex(&norm), canonical, "variant: {variant:?}");
        }
    }

    #[test]
    fn test_hash_differs_across_emails() {
        let hasher = EmailHasher::new(zero_key());
        assert_ne!(
            hasher.hash_hex("john@example.com"),
            hasher.hash_hex("jane@example.com")
        );
    }

    #[test]
    fn test_hash_differs_across_keys() {
        let a = EmailHasher::new(HashKey::from_hex(&"0".repeat(64)).unwrap());
        let b = EmailHasher::new(HashKey::from_hex(&"1".repeat(64)).unwrap());
        assert_ne!(
            a.hash_hex("john@example.com"),
            b.hash_hex("john@example.com")
        );
    }
}
