//! Deterministic encryption of lookup names.
//!
//! A [`LookupKey`] is the AES-256-GCM encryption of a website name under the
//! store's encryption key with a fixed all-zero nonce. Because the nonce is
//! fixed, the same name always maps to the same lookup key, which is what
//! lets `get`/`set`/`remove` address entries without storing names in
//! plaintext.
//!
//! # Security Notes
//!
//! Deterministic encryption is not semantically secure: equal names produce
//! equal lookup keys, so anyone holding the file learns which entries share a
//! name (within one store) and how long each name is. The fixed nonce is
//! confined to this module. Values are always sealed through
//! [`crate::crypto::encrypt_record`] with a random nonce and must never be
//! routed through here.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::crypto::{self, EncryptionKey, NONCE_LEN_BYTES, TAG_LEN};
use crate::error::{KeychainError, Result};

/// The one nonce used for name encryption.
const NAME_NONCE: [u8; NONCE_LEN_BYTES] = [0u8; NONCE_LEN_BYTES];

/// The deterministic ciphertext of a lookup name, used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupKey(Vec<u8>);

impl LookupKey {
    /// Raw ciphertext bytes (name ciphertext with GCM tag).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard base64 encoding, as used in the persisted entries map.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    /// Parse a persisted lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::Malformed`] if `encoded` is not base64 or is
    /// too short to carry a GCM tag.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| KeychainError::malformed(format!("lookup key is not base64: {e}")))?;
        if bytes.len() < TAG_LEN {
            return Err(KeychainError::malformed(format!(
                "lookup key is {} bytes, expected at least {TAG_LEN}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }
}

/// Compute the lookup key for `name` under `key`.
///
/// Deterministic: the same `(key, name)` pair always yields the same
/// [`LookupKey`]; distinct names yield distinct keys.
///
/// # Errors
///
/// Returns [`KeychainError::EncryptionFailed`] if `ring` fails.
pub fn lookup_key_for(key: &EncryptionKey, name: &str) -> Result<LookupKey> {
    crypto::seal(key, NAME_NONCE, name.as_bytes()).map(LookupKey)
}

/// Recover the plaintext name behind `lookup` under `key`.
///
/// # Errors
///
/// Returns [`KeychainError::DecryptionFailed`] if the lookup key was not
/// produced under `key` or has been altered.
pub fn name_for(key: &EncryptionKey, lookup: &LookupKey) -> Result<String> {
    let plaintext = crypto::open(key, NAME_NONCE, lookup.as_bytes())?;
    String::from_utf8(plaintext).map_err(|_| KeychainError::DecryptionFailed {
        reason: "lookup name is not valid UTF-8".into(),
    })
}
