//! A keychain handle that can be shared between async tasks.
//!
//! [`SharedKeychain`] wraps a [`Keychain`] behind an
//! `Arc<tokio::sync::Mutex<_>>` together with a [`SnapshotStore`]. Every
//! mutation goes through [`SharedKeychain::transact`], which applies the
//! change to a copy, serializes it, persists it, and only then publishes it.
//! Two concurrent `set` calls therefore cannot lose each other's update, and
//! a failed write leaves both the in-memory and the persisted state as they
//! were.
//!
//! Key derivation and file I/O run on the blocking thread pool via
//! `tokio::task::spawn_blocking`. The write and the publish of the new state
//! happen together inside one blocking task that owns the lock guard, so
//! dropping a `transact` future midway cannot leave disk ahead of memory.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{KeychainError, Result};
use crate::keychain::Keychain;
use crate::storage::{Snapshot, SnapshotStore};

/// Cloneable, task-safe handle to one unlocked keychain and its storage.
#[derive(Clone)]
pub struct SharedKeychain {
    inner: Arc<Mutex<Keychain>>,
    store: Arc<dyn SnapshotStore>,
}

impl SharedKeychain {
    /// Initialize a new keychain and write its first snapshot to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::AlreadyInitialized`] if `store` already holds
    /// a snapshot, or any error from key derivation or the store.
    pub async fn create(password: &str, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let password = password.to_owned();
        let task_store = Arc::clone(&store);

        let keychain = tokio::task::spawn_blocking(move || -> Result<Keychain> {
            if task_store.exists()? {
                return Err(KeychainError::AlreadyInitialized);
            }
            let keychain = Keychain::initialize(&password)?;
            let (blob, checksum) = keychain.serialize()?;
            task_store.write(&Snapshot { blob, checksum })?;
            Ok(keychain)
        })
        .await??;

        Ok(Self::from_parts(keychain, store))
    }

    /// Unlock the keychain held in `store`.
    ///
    /// The snapshot's checksum is used as the trusted checksum, so a blob
    /// and sidecar that disagree are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::NotInitialized`] if `store` is empty, or any
    /// error from [`Keychain::load_verified`].
    pub async fn open(password: &str, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let password = password.to_owned();
        let task_store = Arc::clone(&store);

        let keychain = tokio::task::spawn_blocking(move || -> Result<Keychain> {
            let snapshot = task_store.read()?.ok_or(KeychainError::NotInitialized)?;
            Keychain::load_verified(&password, &snapshot.blob, &snapshot.checksum)
        })
        .await??;

        Ok(Self::from_parts(keychain, store))
    }

    /// Replace the contents of `store` with `blob`, a keychain exported
    /// earlier, and unlock it.
    ///
    /// The blob is fully loaded with `password` before anything is written,
    /// so a corrupt blob or the wrong password leaves `store` untouched.
    ///
    /// # Errors
    ///
    /// Any error from [`Keychain::load`] or the store.
    pub async fn restore(
        password: &str,
        blob: String,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let password = password.to_owned();
        let task_store = Arc::clone(&store);

        let keychain = tokio::task::spawn_blocking(move || -> Result<Keychain> {
            let keychain = Keychain::load(&password, &blob)?;
            let checksum = keychain.checksum()?;
            task_store.write(&Snapshot { blob, checksum })?;
            Ok(keychain)
        })
        .await??;

        tracing::info!(entries = keychain.len(), "restored keychain");
        Ok(Self::from_parts(keychain, store))
    }

    /// Wrap an already unlocked keychain. Nothing is written until the first
    /// [`transact`](Self::transact).
    pub fn from_parts(keychain: Keychain, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(keychain)),
            store,
        }
    }

    /// Apply `f` to the keychain and persist the result as one atomic step.
    ///
    /// `f` runs against a copy. If `f` fails, or serializing or writing the
    /// copy fails, the error is returned and nothing changes. Otherwise the
    /// copy replaces the live keychain and `f`'s output is returned.
    pub async fn transact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Keychain) -> Result<T>,
    {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;

        let mut draft = Keychain::clone(&guard);
        let output = f(&mut draft)?;
        let (blob, checksum) = draft.serialize()?;

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<()> {
            store.write(&Snapshot { blob, checksum })?;
            *guard = draft;
            Ok(())
        })
        .await??;

        Ok(output)
    }

    /// Store `value` under `name` and persist.
    pub async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.transact(|keychain| keychain.set(name, value)).await
    }

    /// Remove `name` and persist. Returns whether an entry was removed.
    ///
    /// Nothing is written when `name` was absent.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        if !self.inner.lock().await.contains(name)? {
            return Ok(false);
        }
        self.transact(|keychain| keychain.remove(name)).await
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        self.inner.lock().await.get(name)
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        self.inner.lock().await.names()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Serialize the current state without writing it anywhere.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (blob, checksum) = self.inner.lock().await.serialize()?;
        Ok(Snapshot { blob, checksum })
    }
}

impl std::fmt::Debug for SharedKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeychain").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
