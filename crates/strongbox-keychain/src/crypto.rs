//! Key derivation and per-record AES-256-GCM encryption using the `ring`
//! crate.
//!
//! This module provides the cryptographic primitives for the keychain:
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 (100,000 iterations) turning a
//!   master password and a 16-byte salt into an encryption key and a
//!   secondary key.
//! - **Record encryption**: AES-256-GCM with a fresh random 96-bit nonce per
//!   call. Values are padded to a multiple of [`PAD_BLOCK`] bytes before
//!   sealing, so ciphertexts only reveal a coarse length bucket. There is no
//!   upper bound on value length.
//! - **Random generation**: salts and nonces via `ring`'s CSPRNG.
//!
//! # Security Notes
//!
//! - Nonces are random per record. With 96-bit nonces the collision
//!   probability stays negligible for up to ~2^32 encryptions under one key.
//! - The deterministic (fixed-nonce) encryption used for lookup names lives
//!   in [`crate::index`] and is not reachable from here.
//! - Key material is not zeroized on drop.

use std::num::NonZeroU32;

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{KeychainError, Result};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 16;

/// Padded plaintexts are a multiple of this many bytes.
pub const PAD_BLOCK: usize = 64;

/// Marks the end of the value inside a padded plaintext (ISO/IEC 7816-4).
const PAD_MARKER: u8 = 0x80;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("PBKDF2 iteration count must be non-zero"),
};

/// PBKDF2 algorithm: HMAC-SHA256.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

/// A per-store random salt.
pub type Salt = [u8; SALT_LEN];

// ---------------------------------------------------------------------------
// Key types
// ---------------------------------------------------------------------------

/// A 256-bit AES-GCM key.
///
/// The `Debug` implementation never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl From<[u8; KEY_LEN]> for EncryptionKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// The pair of keys produced by one PBKDF2 run.
///
/// The secondary key is reserved: it is derived so that the on-disk key
/// schedule stays stable if a keyed integrity check is introduced, but no
/// code path consumes it today.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    encryption: EncryptionKey,
    secondary: [u8; KEY_LEN],
}

impl DerivedKeys {
    /// The AES-256-GCM key used for records and lookup names.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption
    }

    /// The reserved secondary key (bytes 32..64 of the PBKDF2 output).
    pub fn secondary_key(&self) -> &[u8; KEY_LEN] {
        &self.secondary
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeys(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive the encryption and secondary keys from `password` and `salt`.
///
/// Pure and deterministic: identical inputs always yield identical keys.
/// This is deliberately slow (100,000 PBKDF2 rounds); async callers should
/// run it on a blocking thread.
pub fn derive_keys(password: &str, salt: &Salt) -> DerivedKeys {
    let keys = derive_keys_with_iterations(password.as_bytes(), salt, PBKDF2_ITERATIONS);
    tracing::debug!(
        iterations = PBKDF2_ITERATIONS.get(),
        "derived keychain keys via PBKDF2"
    );
    keys
}

/// PBKDF2-HMAC-SHA256 producing 512 bits, split into the two keys.
pub(crate) fn derive_keys_with_iterations(
    password: &[u8],
    salt: &[u8],
    iterations: NonZeroU32,
) -> DerivedKeys {
    let mut out = [0u8; 2 * KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, password, &mut out);

    let mut encryption = [0u8; KEY_LEN];
    let mut secondary = [0u8; KEY_LEN];
    encryption.copy_from_slice(&out[..KEY_LEN]);
    secondary.copy_from_slice(&out[KEY_LEN..]);

    DerivedKeys {
        encryption: EncryptionKey(encryption),
        secondary,
    }
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing and opening keys. Every
/// key we bind is used for exactly one operation.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Seal `plaintext` under `key` and `nonce`, returning ciphertext || tag.
pub(crate) fn seal(
    key: &EncryptionKey,
    nonce: [u8; NONCE_LEN_BYTES],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| KeychainError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce(Some(nonce)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| KeychainError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;
    Ok(in_out)
}

/// Open ciphertext || tag under `key` and `nonce`.
pub(crate) fn open(
    key: &EncryptionKey,
    nonce: [u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| KeychainError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce(Some(nonce)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| KeychainError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted record".into(),
        })?;
    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Record encryption
// ---------------------------------------------------------------------------

/// The authenticated encryption of one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Random 96-bit nonce, unique per record.
    pub iv: [u8; NONCE_LEN_BYTES],
    /// Padded value ciphertext with the 128-bit GCM tag appended.
    pub ciphertext: Vec<u8>,
}

/// Encrypt `value` under `key` with a freshly generated nonce.
///
/// # Errors
///
/// Returns [`KeychainError::EncryptionFailed`] if the CSPRNG or `ring`
/// fails.
pub fn encrypt_record(key: &EncryptionKey, value: &str) -> Result<Record> {
    let padded = pad_value(value);
    let iv = random_nonce()?;
    let ciphertext = seal(key, iv, &padded)?;

    tracing::trace!(ciphertext_len = ciphertext.len(), "encrypted record");
    Ok(Record { iv, ciphertext })
}

/// Decrypt and authenticate `record` under `key`.
///
/// # Errors
///
/// Returns [`KeychainError::DecryptionFailed`] if the tag does not verify
/// (wrong key or tampered record) or the decrypted padding is invalid.
pub fn decrypt_record(key: &EncryptionKey, record: &Record) -> Result<String> {
    let padded = open(key, record.iv, &record.ciphertext)?;
    let value = unpad_value(padded)?;

    tracing::trace!(ciphertext_len = record.ciphertext.len(), "decrypted record");
    Ok(value)
}

/// Append the `0x80` marker and zero-fill up to the next multiple of
/// [`PAD_BLOCK`]. The marker is always present, so an exact multiple grows
/// by one block.
fn pad_value(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded_len = (bytes.len() / PAD_BLOCK + 1) * PAD_BLOCK;

    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(bytes);
    padded.push(PAD_MARKER);
    padded.resize(padded_len, 0);
    padded
}

fn unpad_value(mut padded: Vec<u8>) -> Result<String> {
    let invalid = |reason: &str| KeychainError::DecryptionFailed {
        reason: reason.to_string(),
    };

    if padded.is_empty() || padded.len() % PAD_BLOCK != 0 {
        return Err(invalid("record padding has the wrong size"));
    }
    let marker = padded
        .iter()
        .rposition(|&b| b != 0)
        .ok_or_else(|| invalid("record padding marker missing"))?;
    if padded[marker] != PAD_MARKER {
        return Err(invalid("record padding marker missing"));
    }
    padded.truncate(marker);

    String::from_utf8(padded).map_err(|_| invalid("record is not valid UTF-8"))
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate a fresh random salt for a new store.
///
/// # Errors
///
/// Returns [`KeychainError::KeyDerivationFailed`] if the system CSPRNG fails.
pub fn generate_salt() -> Result<Salt> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| KeychainError::KeyDerivationFailed {
            reason: "failed to generate random salt".into(),
        })?;
    Ok(salt)
}

fn random_nonce() -> Result<[u8; NONCE_LEN_BYTES]> {
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| KeychainError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;
    Ok(nonce)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
