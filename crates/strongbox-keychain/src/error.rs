//! Keychain error types.
//!
//! Every public API in this crate returns [`KeychainError`]. The variants are
//! split so that a caller can tell a corrupted file apart from a wrong
//! password without inspecting message strings. No variant ever carries a
//! password, key, plaintext name, or plaintext value.

/// Unified error type for the strongbox keychain.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    // -- Load errors --------------------------------------------------------
    /// The serialized blob could not be parsed into salt, entries and
    /// checksum.
    #[error("malformed keychain data: {reason}")]
    Malformed { reason: String },

    /// The recomputed checksum disagrees with the stored (or trusted)
    /// checksum. The data was corrupted or tampered with.
    #[error("keychain integrity check failed")]
    IntegrityViolation,

    /// The integrity check passed but no stored record authenticates under
    /// the derived key.
    #[error("wrong master password")]
    WrongPassword,

    // -- Crypto errors ------------------------------------------------------
    /// Authentication-tag verification failed for a specific record.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Encryption failed (ring internal error or CSPRNG failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Key derivation failed (e.g. salt generation).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Store errors -------------------------------------------------------
    /// No snapshot exists yet in the backing store.
    #[error("no keychain has been initialized")]
    NotInitialized,

    /// A snapshot already exists; refusing to overwrite it with a new store.
    #[error("a keychain already exists")]
    AlreadyInitialized,

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from a snapshot store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant. Prefer a typed variant whenever possible.
    #[error("internal keychain error: {0}")]
    Internal(String),
}

impl KeychainError {
    /// Build a [`KeychainError::Malformed`] from anything displayable.
    pub(crate) fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for KeychainError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Convenience alias used throughout the keychain crate.
pub type Result<T> = std::result::Result<T, KeychainError>;
