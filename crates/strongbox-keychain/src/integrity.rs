//! Whole-store checksum.
//!
//! The checksum is SHA-256 over the canonical serialization of the entries
//! map: a JSON object keyed by base64 lookup key, sorted, with each record
//! encoded as `{"iv": ..., "ciphertext": ...}`. Sorting makes the digest
//! independent of in-memory iteration order. An empty store hashes the two
//! bytes `{}`.
//!
//! The digest is unkeyed: it detects corruption and tampering by anyone who
//! does not also recompute it. Callers that keep the checksum returned by
//! [`Keychain::serialize`](crate::Keychain::serialize) in trusted storage can
//! close that gap with [`Keychain::load_verified`](crate::Keychain::load_verified).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::digest::{SHA256, SHA256_OUTPUT_LEN, digest};

use crate::crypto::Record;
use crate::error::{KeychainError, Result};
use crate::format;
use crate::index::LookupKey;

/// A SHA-256 digest over a store's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum([u8; SHA256_OUTPUT_LEN]);

impl Checksum {
    pub fn as_bytes(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Parse a base64-encoded checksum.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::Malformed`] unless `encoded` is base64 for
    /// exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| KeychainError::malformed(format!("checksum is not base64: {e}")))?;
        let out: [u8; SHA256_OUTPUT_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            KeychainError::malformed(format!(
                "checksum is {} bytes, expected {SHA256_OUTPUT_LEN}",
                b.len()
            ))
        })?;
        Ok(Self(out))
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Compute the checksum of `entries`, in whatever order they are supplied.
///
/// # Errors
///
/// Returns [`KeychainError::Serialization`] if the canonical form cannot be
/// produced.
pub fn compute_checksum<'a, I>(entries: I) -> Result<Checksum>
where
    I: IntoIterator<Item = (&'a LookupKey, &'a Record)>,
{
    let canonical = format::canonical_entries(entries)?;
    let hash = digest(&SHA256, &canonical);

    let mut out = [0u8; SHA256_OUTPUT_LEN];
    out.copy_from_slice(hash.as_ref());
    Ok(Checksum(out))
}

/// Recompute the checksum of `entries` and compare it with `expected`.
///
/// # Errors
///
/// Propagates errors from [`compute_checksum`]. A mismatch is `Ok(false)`;
/// the caller decides to fail closed.
pub fn verify<'a, I>(entries: I, expected: &Checksum) -> Result<bool>
where
    I: IntoIterator<Item = (&'a LookupKey, &'a Record)>,
{
    let actual = compute_checksum(entries)?;
    let ok = actual == *expected;
    if !ok {
        tracing::debug!("entries checksum mismatch");
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::crypto::{self, tests::random_key};
    use crate::index::lookup_key_for;

    fn sample_entries(names: &[&str]) -> Vec<(LookupKey, Record)> {
        let key = random_key();
        names
            .iter()
            .map(|name| {
                (
                    lookup_key_for(&key, name).unwrap(),
                    crypto::encrypt_record(&key, "pw").unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn empty_entries_hash_canonical_empty_object() {
        let empty: HashMap<LookupKey, Record> = HashMap::new();
        let checksum = compute_checksum(&empty).unwrap();
        assert_eq!(checksum.as_bytes().as_slice(), digest(&SHA256, b"{}").as_ref());
    }

    #[test]
    fn checksum_ignores_insertion_order() {
        let entries = sample_entries(&["a.com", "b.com", "c.com", "d.com"]);

        let forward = compute_checksum(entries.iter().map(|(k, r)| (k, r))).unwrap();
        let backward = compute_checksum(entries.iter().rev().map(|(k, r)| (k, r))).unwrap();

        let mut map = HashMap::new();
        for (k, r) in entries.iter().skip(2).chain(entries.iter().take(2)) {
            map.insert(k.clone(), r.clone());
        }
        let from_map = compute_checksum(&map).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward, from_map);
    }

    #[test]
    fn checksum_detects_modified_record() {
        let mut entries = sample_entries(&["a.com", "b.com"]);
        let expected = compute_checksum(entries.iter().map(|(k, r)| (k, r))).unwrap();

        entries[1].1.ciphertext[0] ^= 0x01;

        assert!(!verify(entries.iter().map(|(k, r)| (k, r)), &expected).unwrap());
    }

    #[test]
    fn verify_accepts_matching_checksum() {
        let entries = sample_entries(&["a.com"]);
        let expected = compute_checksum(entries.iter().map(|(k, r)| (k, r))).unwrap();
        assert!(verify(entries.iter().map(|(k, r)| (k, r)), &expected).unwrap());
    }

    #[test]
    fn checksum_base64_roundtrip() {
        let checksum = compute_checksum(std::iter::empty::<(&LookupKey, &Record)>()).unwrap();
        let parsed = Checksum::from_base64(&checksum.to_string()).unwrap();
        assert_eq!(parsed, checksum);

        assert!(matches!(
            Checksum::from_base64("AAAA"),
            Err(KeychainError::Malformed { .. })
        ));
    }
}
