//! The password keychain.
//!
//! A [`Keychain`] is an unlocked, in-memory store mapping encrypted website
//! names to encrypted passwords. It is created empty with
//! [`Keychain::initialize`] or reconstructed from a blob with
//! [`Keychain::load`], after which it accepts any sequence of
//! `get`/`set`/`remove`/`serialize` calls. There is no "lock" operation;
//! dropping the value discards the derived keys.
//!
//! The keychain never touches the filesystem or network. Persisting the
//! `(blob, checksum)` pair returned by [`Keychain::serialize`] is up to the
//! caller (see [`crate::storage`] and [`crate::shared`]).
//!
//! # Concurrency
//!
//! Mutations take `&mut self` and there is no internal locking. A
//! `set`/`remove` followed by `serialize` is a read-modify-write of the whole
//! entries map; callers sharing one keychain between tasks must serialize
//! those sequences themselves or use [`SharedKeychain`](crate::SharedKeychain).
//!
//! # Limitations
//!
//! A wrong password is only detectable when the store holds at least one
//! entry. Loading an empty store with the wrong password succeeds, and
//! every name simply appears absent.

use std::collections::HashMap;

use crate::crypto::{self, DerivedKeys, Record, Salt};
use crate::error::{KeychainError, Result};
use crate::format;
use crate::index::{self, LookupKey};
use crate::integrity::{self, Checksum};

/// An unlocked keychain.
#[derive(Clone)]
pub struct Keychain {
    salt: Salt,
    keys: DerivedKeys,
    entries: HashMap<LookupKey, Record>,
}

impl Keychain {
    /// Create an empty keychain protected by `password`.
    ///
    /// A fresh random salt is generated; it is persisted with the store and
    /// never changes afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::KeyDerivationFailed`] if salt generation
    /// fails.
    pub fn initialize(password: &str) -> Result<Self> {
        let salt = crypto::generate_salt()?;
        let keys = crypto::derive_keys(password, &salt);

        tracing::info!("initialized new keychain");
        Ok(Self {
            salt,
            keys,
            entries: HashMap::new(),
        })
    }

    /// Unlock a keychain from a blob previously produced by
    /// [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// - [`KeychainError::Malformed`] if the blob cannot be parsed.
    /// - [`KeychainError::IntegrityViolation`] if the embedded checksum does
    ///   not match the entries.
    /// - [`KeychainError::WrongPassword`] if the store has entries and none
    ///   of them authenticates under the derived key.
    pub fn load(password: &str, blob: &str) -> Result<Self> {
        let decoded = format::decode(blob)?;
        Self::unlock(password, decoded)
    }

    /// Like [`load`](Self::load), but additionally requires the blob's
    /// checksum to equal `trusted`, a checksum the caller kept somewhere an
    /// attacker cannot write.
    ///
    /// This defeats rollback to an older blob and tampering that recomputes
    /// the embedded checksum.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load); a mismatch with `trusted` is an
    /// [`KeychainError::IntegrityViolation`].
    pub fn load_verified(password: &str, blob: &str, trusted: &Checksum) -> Result<Self> {
        let decoded = format::decode(blob)?;
        if decoded.checksum != *trusted {
            tracing::warn!("keychain checksum does not match trusted checksum");
            return Err(KeychainError::IntegrityViolation);
        }
        Self::unlock(password, decoded)
    }

    fn unlock(password: &str, decoded: format::DecodedStore) -> Result<Self> {
        if !integrity::verify(&decoded.entries, &decoded.checksum)? {
            tracing::warn!("keychain integrity check failed");
            return Err(KeychainError::IntegrityViolation);
        }

        let keys = crypto::derive_keys(password, &decoded.salt);
        let keychain = Self {
            salt: decoded.salt,
            keys,
            entries: decoded.entries,
        };
        keychain.check_password()?;

        tracing::info!(entries = keychain.entries.len(), "unlocked keychain");
        Ok(keychain)
    }

    /// Check that the derived key opens at least one stored record.
    ///
    /// Records are tried in canonical order. Under the right key the first
    /// one succeeds; a single damaged record cannot pass for a wrong
    /// password because the check moves on to the next.
    fn check_password(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let mut records: Vec<_> = self.entries.iter().collect();
        records.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let opened = records
            .into_iter()
            .any(|(_, record)| crypto::decrypt_record(self.keys.encryption_key(), record).is_ok());
        if opened {
            Ok(())
        } else {
            tracing::debug!(
                entries = self.entries.len(),
                "no record authenticates under derived key"
            );
            Err(KeychainError::WrongPassword)
        }
    }

    // -- Entry operations ---------------------------------------------------

    /// Return the password stored for `name`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::DecryptionFailed`] if the entry exists but
    /// its record does not authenticate.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        let lookup = self.lookup_key(name)?;
        match self.entries.get(&lookup) {
            Some(record) => crypto::decrypt_record(self.keys.encryption_key(), record).map(Some),
            None => Ok(None),
        }
    }

    /// Store `value` under `name`, replacing any existing entry. Values of
    /// any length are accepted.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let lookup = self.lookup_key(name)?;
        let record = crypto::encrypt_record(self.keys.encryption_key(), value)?;
        let replaced = self.entries.insert(lookup, record).is_some();

        tracing::debug!(replaced, entries = self.entries.len(), "stored entry");
        Ok(())
    }

    /// Remove the entry for `name`. Returns whether an entry was removed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let lookup = self.lookup_key(name)?;
        let removed = self.entries.remove(&lookup).is_some();

        tracing::debug!(removed, entries = self.entries.len(), "removed entry");
        Ok(removed)
    }

    /// Whether an entry exists for `name`. Does not decrypt the record.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let lookup = self.lookup_key(name)?;
        Ok(self.entries.contains_key(&lookup))
    }

    /// The plaintext names of all entries, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::DecryptionFailed`] if a lookup key does not
    /// decrypt under this store's key.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = self
            .entries
            .keys()
            .map(|lookup| index::name_for(self.keys.encryption_key(), lookup))
            .collect::<Result<Vec<_>>>()?;
        names.sort_unstable();
        Ok(names)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -- Persistence --------------------------------------------------------

    /// Encode the store, returning the blob and the checksum it embeds.
    ///
    /// The checksum is recomputed over the current entries on every call.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::Serialization`] if encoding fails.
    pub fn serialize(&self) -> Result<(String, Checksum)> {
        format::encode(&self.salt, &self.entries)
    }

    /// The checksum of the current entries.
    pub fn checksum(&self) -> Result<Checksum> {
        integrity::compute_checksum(&self.entries)
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    fn lookup_key(&self, name: &str) -> Result<LookupKey> {
        index::lookup_key_for(self.keys.encryption_key(), name)
    }
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
