//! Password keychain for strongbox.
//!
//! This crate turns a master password into an encrypted, tamper-evident
//! store of website → password records. Everything sensitive is encrypted
//! with AES-256-GCM under a key derived by PBKDF2-HMAC-SHA256, and every load
//! verifies a SHA-256 checksum over the stored entries.
//!
//! # Modules
//!
//! - [`crypto`]: PBKDF2 key derivation, per-record AES-256-GCM.
//! - [`index`]: deterministic encryption of lookup names.
//! - [`integrity`]: whole-store checksum computation and verification.
//! - [`format`]: the persisted JSON representation.
//! - [`keychain`]: the unlocked in-memory [`Keychain`].
//! - [`storage`]: file and in-memory snapshot stores.
//! - [`shared`]: [`SharedKeychain`], a task-safe handle that persists every
//!   mutation.
//! - [`error`]: Unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use strongbox_keychain::Keychain;
//!
//! # fn example() -> strongbox_keychain::Result<()> {
//! let mut keychain = Keychain::initialize("correct horse battery staple")?;
//! keychain.set("example.com", "s3cr3t")?;
//!
//! // Persist `blob` anywhere; keep `checksum` somewhere trusted.
//! let (blob, checksum) = keychain.serialize()?;
//!
//! let reopened = Keychain::load_verified("correct horse battery staple", &blob, &checksum)?;
//! assert_eq!(reopened.get("example.com")?.as_deref(), Some("s3cr3t"));
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod format;
pub mod index;
pub mod integrity;
pub mod keychain;
pub mod shared;
pub mod storage;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{KeychainError, Result};
pub use integrity::Checksum;
pub use keychain::Keychain;
pub use shared::SharedKeychain;
pub use storage::{FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotStore};
