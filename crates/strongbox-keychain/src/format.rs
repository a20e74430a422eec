//! Persisted representation of a keychain.
//!
//! A store is written as a single JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "salt": "<base64, 16 bytes>",
//!   "entries": {
//!     "<base64 lookup key>": { "iv": "<base64, 12 bytes>", "ciphertext": "<base64>" }
//!   },
//!   "checksum": "<base64 SHA-256 of the canonical entries>"
//! }
//! ```
//!
//! `entries` is a sorted map, so the `entries` value inside a blob is
//! byte-for-byte the canonical form hashed by [`crate::integrity`].

use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::crypto::{NONCE_LEN_BYTES, Record, SALT_LEN, Salt, TAG_LEN};
use crate::error::{KeychainError, Result};
use crate::index::LookupKey;
use crate::integrity::{self, Checksum};

/// Current blob format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersistedStore {
    version: u32,
    salt: String,
    entries: BTreeMap<String, EncodedRecord>,
    checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncodedRecord {
    iv: String,
    ciphertext: String,
}

impl EncodedRecord {
    fn encode(record: &Record) -> Self {
        Self {
            iv: BASE64.encode(record.iv),
            ciphertext: BASE64.encode(&record.ciphertext),
        }
    }

    fn decode(&self) -> Result<Record> {
        let iv = decode_fixed::<NONCE_LEN_BYTES>(&self.iv, "iv")?;
        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|e| KeychainError::malformed(format!("ciphertext is not base64: {e}")))?;
        if ciphertext.len() < TAG_LEN {
            return Err(KeychainError::malformed(format!(
                "ciphertext is {} bytes, shorter than the {TAG_LEN}-byte tag",
                ciphertext.len()
            )));
        }
        Ok(Record { iv, ciphertext })
    }
}

/// A parsed blob. Nothing in it has been verified yet.
#[derive(Debug)]
pub struct DecodedStore {
    pub salt: Salt,
    pub entries: HashMap<LookupKey, Record>,
    pub checksum: Checksum,
}

/// Serialize the canonical (sorted) entries map used for checksumming.
pub(crate) fn canonical_entries<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a LookupKey, &'a Record)>,
{
    Ok(serde_json::to_vec(&encode_entries(entries))?)
}

fn encode_entries<'a, I>(entries: I) -> BTreeMap<String, EncodedRecord>
where
    I: IntoIterator<Item = (&'a LookupKey, &'a Record)>,
{
    entries
        .into_iter()
        .map(|(lookup, record)| (lookup.to_base64(), EncodedRecord::encode(record)))
        .collect()
}

/// Produce the blob for `salt` and `entries`, recomputing the checksum.
///
/// Returns the blob together with the checksum it embeds.
///
/// # Errors
///
/// Returns [`KeychainError::Serialization`] if JSON encoding fails.
pub fn encode(salt: &Salt, entries: &HashMap<LookupKey, Record>) -> Result<(String, Checksum)> {
    let checksum = integrity::compute_checksum(entries)?;
    let persisted = PersistedStore {
        version: FORMAT_VERSION,
        salt: BASE64.encode(salt),
        entries: encode_entries(entries),
        checksum: checksum.to_base64(),
    };

    let blob = serde_json::to_string(&persisted)?;
    tracing::debug!(
        entries = entries.len(),
        blob_len = blob.len(),
        "encoded keychain"
    );
    Ok((blob, checksum))
}

/// Parse `blob` into its salt, entries and embedded checksum.
///
/// # Errors
///
/// Returns [`KeychainError::Malformed`] for invalid JSON, an unknown version,
/// bad base64, or fields of the wrong length.
pub fn decode(blob: &str) -> Result<DecodedStore> {
    let persisted: PersistedStore =
        serde_json::from_str(blob).map_err(|e| KeychainError::malformed(format!("{e}")))?;

    if persisted.version != FORMAT_VERSION {
        return Err(KeychainError::malformed(format!(
            "unsupported format version {}",
            persisted.version
        )));
    }

    let salt = decode_fixed::<SALT_LEN>(&persisted.salt, "salt")?;
    let checksum = Checksum::from_base64(&persisted.checksum)?;

    let mut entries = HashMap::with_capacity(persisted.entries.len());
    for (lookup, record) in &persisted.entries {
        entries.insert(LookupKey::from_base64(lookup)?, record.decode()?);
    }

    tracing::debug!(entries = entries.len(), "decoded keychain");
    Ok(DecodedStore {
        salt,
        entries,
        checksum,
    })
}

fn decode_fixed<const N: usize>(encoded: &str, field: &str) -> Result<[u8; N]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| KeychainError::malformed(format!("{field} is not base64: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        KeychainError::malformed(format!("{field} is {} bytes, expected {N}", b.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{self, tests::random_key};
    use crate::index::lookup_key_for;

    fn sample() -> (Salt, HashMap<LookupKey, Record>) {
        let key = random_key();
        let mut entries = HashMap::new();
        for (name, value) in [("example.com", "s3cr3t"), ("mail.org", "hunter2")] {
            entries.insert(
                lookup_key_for(&key, name).unwrap(),
                crypto::encrypt_record(&key, value).unwrap(),
            );
        }
        ([9u8; SALT_LEN], entries)
    }

    #[test]
    fn decode_restores_encoded_store() {
        let (salt, entries) = sample();
        let (blob, checksum) = encode(&salt, &entries).unwrap();

        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.salt, salt);
        assert_eq!(decoded.entries, entries);
        assert_eq!(decoded.checksum, checksum);
    }

    #[test]
    fn empty_store_blob_shape() {
        let (blob, checksum) = encode(&[0u8; SALT_LEN], &HashMap::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["entries"], serde_json::json!({}));
        assert_eq!(value["checksum"], checksum.to_base64());
        assert_eq!(value["salt"], BASE64.encode([0u8; SALT_LEN]));
    }

    #[test]
    fn malformed_blobs_rejected() {
        let (salt, entries) = sample();
        let (blob, _) = encode(&salt, &entries).unwrap();
        let valid: serde_json::Value = serde_json::from_str(&blob).unwrap();

        let mut cases = vec![
            "not json".to_string(),
            "{}".to_string(),
            "[]".to_string(),
        ];
        for (field, bad) in [
            ("version", serde_json::json!(2)),
            ("salt", serde_json::json!("AAAA")),
            ("salt", serde_json::json!("%%%")),
            ("checksum", serde_json::json!("AAAA")),
            ("entries", serde_json::json!({ "AAAA": { "iv": "", "ciphertext": "" } })),
        ] {
            let mut doc = valid.clone();
            doc[field] = bad;
            cases.push(doc.to_string());
        }

        for case in cases {
            assert!(
                matches!(decode(&case), Err(KeychainError::Malformed { .. })),
                "accepted: {case}"
            );
        }
    }

    #[test]
    fn short_ciphertext_rejected() {
        let record = EncodedRecord {
            iv: BASE64.encode([0u8; NONCE_LEN_BYTES]),
            ciphertext: BASE64.encode([0u8; TAG_LEN - 1]),
        };
        assert!(matches!(
            record.decode(),
            Err(KeychainError::Malformed { .. })
        ));
    }
}
