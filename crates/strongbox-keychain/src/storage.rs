//! Where serialized keychains live.
//!
//! [`Keychain`](crate::Keychain) itself performs no I/O. This module provides
//! a [`SnapshotStore`] trait for persisting the `(blob, checksum)` pair that
//! [`Keychain::serialize`](crate::Keychain::serialize) produces:
//!
//! - [`FileSnapshotStore`] writes the blob to a file and the checksum to a
//!   sidecar `<file>.sha256`. Keeping the sidecar somewhere safer than the
//!   blob turns it into a trusted checksum for
//!   [`Keychain::load_verified`](crate::Keychain::load_verified).
//! - [`MemorySnapshotStore`] keeps the latest snapshot in memory.
//!
//! # Security Notes
//!
//! - On Unix both files are created with mode 0600.
//! - Writes go to a temporary sibling file that is renamed into place, so a
//!   crash never leaves a half-written blob behind.
//! - The new checksum is staged in `<file>.sha256.new` before the blob is
//!   replaced and promoted afterwards. A crash at any point leaves a blob
//!   that matches either the committed or the staged checksum.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{KeychainError, Result};
use crate::format;
use crate::integrity::Checksum;

/// A persisted keychain: the blob plus the checksum it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub blob: String,
    pub checksum: Checksum,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over snapshot persistence backends.
///
/// Implementations must be `Send + Sync` so a store can be shared with
/// blocking tasks.
pub trait SnapshotStore: Send + Sync {
    /// Read the current snapshot, or `None` if nothing has been written yet.
    fn read(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot.
    fn write(&self, snapshot: &Snapshot) -> Result<()>;

    /// Whether a snapshot has been written.
    fn exists(&self) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// File-based store
// ---------------------------------------------------------------------------

/// File-backed snapshot store.
///
/// Layout:
/// ```text
/// <path>             the JSON blob
/// <path>.sha256      base64 checksum, one line
/// <path>.sha256.new  checksum of a write in progress
/// ```
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store for the blob at `path`. Nothing is touched until the
    /// first [`write`](SnapshotStore::write).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the checksum sidecar.
    pub fn checksum_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Path of the staged checksum written ahead of the blob.
    pub fn pending_checksum_path(&self) -> PathBuf {
        let mut name = self.checksum_path().into_os_string();
        name.push(".new");
        PathBuf::from(name)
    }

    fn read_checksum(path: &Path) -> Result<Option<Checksum>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(Checksum::from_base64(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stage `checksum` next to the committed one.
    fn stage_checksum(&self, checksum: &Checksum) -> Result<()> {
        let line = format!("{checksum}\n");
        Self::write_private(&self.pending_checksum_path(), line.as_bytes())
    }

    /// Promote the staged checksum to the committed sidecar.
    fn commit_checksum(&self) -> Result<()> {
        std::fs::rename(self.pending_checksum_path(), self.checksum_path())?;
        Ok(())
    }

    fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        std::fs::write(&tmp, contents)?;

        // Restrict file permissions on Unix (owner read/write only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    /// Read the blob with the checksum it was committed under.
    ///
    /// If the committed sidecar does not describe the blob but the staged
    /// one does, the previous write stopped between replacing the blob and
    /// promoting its checksum, and the staged checksum is returned. In every
    /// other case the committed checksum is returned as is.
    fn read(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let blob = std::fs::read_to_string(&self.path)?;
        let committed = Self::read_checksum(&self.checksum_path())?;
        let pending = Self::read_checksum(&self.pending_checksum_path())?;

        let checksum = match (committed, pending) {
            (Some(committed), None) => committed,
            (committed, Some(pending)) => {
                let embedded = format::decode(&blob)?.checksum;
                match committed {
                    Some(committed) if committed == embedded => committed,
                    _ if pending == embedded => {
                        tracing::warn!(
                            path = %self.path.display(),
                            "recovering checksum from interrupted write"
                        );
                        pending
                    }
                    Some(committed) => committed,
                    None => pending,
                }
            }
            (None, None) => {
                return Err(KeychainError::malformed(format!(
                    "checksum file {} is missing",
                    self.checksum_path().display()
                )));
            }
        };

        tracing::debug!(path = %self.path.display(), "read keychain snapshot");
        Ok(Some(Snapshot { blob, checksum }))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        self.stage_checksum(&snapshot.checksum)?;
        Self::write_private(&self.path, snapshot.blob.as_bytes())?;
        self.commit_checksum()?;

        tracing::info!(path = %self.path.display(), "wrote keychain snapshot");
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Snapshot store that keeps the latest snapshot in memory.
#[derive(Default)]
pub struct MemorySnapshotStore {
    current: Mutex<Option<Snapshot>>,
    writes: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|n| *n).unwrap_or_default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self) -> Result<Option<Snapshot>> {
        let current = self
            .current
            .lock()
            .map_err(|e| KeychainError::Internal(format!("mutex poisoned: {e}")))?;
        Ok(current.clone())
    }

    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| KeychainError::Internal(format!("mutex poisoned: {e}")))?;
        *current = Some(snapshot.clone());

        let mut writes = self
            .writes
            .lock()
            .map_err(|e| KeychainError::Internal(format!("mutex poisoned: {e}")))?;
        *writes += 1;
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.read()?.is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
