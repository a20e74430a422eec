//! Integration tests for the strongbox-keychain crate.
//!
//! These tests exercise the full keychain lifecycle: initialization, entry
//! operations, serialization, and every way a load can fail.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use strongbox_keychain::crypto::{self, SALT_LEN};
use strongbox_keychain::index::lookup_key_for;
use strongbox_keychain::{
    FileSnapshotStore, Keychain, KeychainError, SharedKeychain, SnapshotStore, format, integrity,
};

/// Flip one bit inside the first entry's ciphertext, leaving the checksum
/// untouched.
fn flip_ciphertext_bit(blob: &str) -> String {
    let mut doc: serde_json::Value = serde_json::from_str(blob).unwrap();
    let entries = doc["entries"].as_object_mut().unwrap();
    let record = entries.values_mut().next().unwrap();

    let mut ciphertext = BASE64
        .decode(record["ciphertext"].as_str().unwrap())
        .unwrap();
    ciphertext[0] ^= 0x01;
    record["ciphertext"] = serde_json::Value::String(BASE64.encode(ciphertext));

    doc.to_string()
}

fn keychain_with(entries: &[(&str, &str)]) -> Keychain {
    let mut keychain = Keychain::initialize("correct-pw").unwrap();
    for (name, value) in entries {
        keychain.set(name, value).unwrap();
    }
    keychain
}

// ═══════════════════════════════════════════════════════════════════════
//  Lifecycle scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn initialize_serializes_empty_entries() {
    let keychain = Keychain::initialize("correct-pw").unwrap();
    let (blob, checksum) = keychain.serialize().unwrap();

    let doc: serde_json::Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(doc["entries"], serde_json::json!({}));

    let empty_digest = ring::digest::digest(&ring::digest::SHA256, b"{}");
    assert_eq!(checksum.as_bytes().as_slice(), empty_digest.as_ref());
    assert_eq!(doc["checksum"], checksum.to_base64());
}

#[test]
fn set_then_get_returns_value() {
    let mut keychain = Keychain::initialize("correct-pw").unwrap();
    keychain.set("example.com", "s3cr3t").unwrap();

    assert_eq!(
        keychain.get("example.com").unwrap().as_deref(),
        Some("s3cr3t")
    );
}

#[test]
fn remove_then_get_is_absent() {
    let mut keychain = keychain_with(&[("example.com", "s3cr3t")]);

    assert!(keychain.remove("example.com").unwrap());
    assert_eq!(keychain.get("example.com").unwrap(), None);
}

#[test]
fn remove_unknown_name_returns_false() {
    let mut keychain = keychain_with(&[("example.com", "s3cr3t")]);
    let before = keychain.serialize().unwrap().1;

    assert!(!keychain.remove("nosuch.com").unwrap());
    assert_eq!(keychain.serialize().unwrap().1, before);
}

#[test]
fn flipped_ciphertext_fails_integrity() {
    let keychain = keychain_with(&[("example.com", "s3cr3t")]);
    let (blob, _) = keychain.serialize().unwrap();

    let result = Keychain::load("correct-pw", &flip_ciphertext_bit(&blob));
    assert!(matches!(result, Err(KeychainError::IntegrityViolation)));
}

#[test]
fn other_password_is_wrong_password() {
    let keychain = keychain_with(&[("example.com", "s3cr3t")]);
    let (blob, _) = keychain.serialize().unwrap();

    let result = Keychain::load("other-pw", &blob);
    assert!(matches!(result, Err(KeychainError::WrongPassword)));
}

// ═══════════════════════════════════════════════════════════════════════
//  Load and tamper detection
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn load_restores_all_entries() {
    let keychain = keychain_with(&[
        ("example.com", "s3cr3t"),
        ("mail.org", "hunter2"),
        ("bank.net", ""),
    ]);
    let (blob, _) = keychain.serialize().unwrap();

    let loaded = Keychain::load("correct-pw", &blob).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.get("mail.org").unwrap().as_deref(), Some("hunter2"));
    assert_eq!(loaded.get("bank.net").unwrap().as_deref(), Some(""));
    assert_eq!(
        loaded.names().unwrap(),
        vec!["bank.net", "example.com", "mail.org"]
    );
}

#[test]
fn loaded_keychain_accepts_further_mutations() {
    let keychain = keychain_with(&[("example.com", "s3cr3t")]);
    let (blob, _) = keychain.serialize().unwrap();

    let mut loaded = Keychain::load("correct-pw", &blob).unwrap();
    loaded.set("example.com", "rotated").unwrap();
    loaded.set("new.io", "fresh").unwrap();
    let (blob, _) = loaded.serialize().unwrap();

    let reloaded = Keychain::load("correct-pw", &blob).unwrap();
    assert_eq!(
        reloaded.get("example.com").unwrap().as_deref(),
        Some("rotated")
    );
    assert_eq!(reloaded.get("new.io").unwrap().as_deref(), Some("fresh"));
}

#[test]
fn flipped_checksum_fails_integrity() {
    let keychain = keychain_with(&[("example.com", "s3cr3t")]);
    let (blob, checksum) = keychain.serialize().unwrap();

    let mut bytes = *checksum.as_bytes();
    bytes[31] ^= 0x80;
    let mut doc: serde_json::Value = serde_json::from_str(&blob).unwrap();
    doc["checksum"] = serde_json::Value::String(BASE64.encode(bytes));

    let result = Keychain::load("correct-pw", &doc.to_string());
    assert!(matches!(result, Err(KeychainError::IntegrityViolation)));
}

#[test]
fn tampered_record_with_recomputed_checksum_fails_on_get() {
    let keychain = keychain_with(&[("example.com", "s3cr3t"), ("mail.org", "hunter2")]);
    let (blob, _) = keychain.serialize().unwrap();

    // An attacker without the password can still rewrite the unkeyed checksum.
    let mut decoded = format::decode(&blob).unwrap();
    let keys = crypto::derive_keys("correct-pw", &decoded.salt);
    let target = lookup_key_for(keys.encryption_key(), "example.com").unwrap();
    decoded.entries.get_mut(&target).unwrap().ciphertext[3] ^= 0x01;
    let (forged, _) = format::encode(&decoded.salt, &decoded.entries).unwrap();

    let loaded = Keychain::load("correct-pw", &forged).unwrap();
    assert!(matches!(
        loaded.get("example.com"),
        Err(KeychainError::DecryptionFailed { .. })
    ));
    assert_eq!(loaded.get("mail.org").unwrap().as_deref(), Some("hunter2"));
}

#[test]
fn trusted_checksum_blocks_forgery_and_rollback() {
    let mut keychain = keychain_with(&[("example.com", "old")]);
    let (old_blob, _) = keychain.serialize().unwrap();
    keychain.set("example.com", "new").unwrap();
    let (new_blob, trusted) = keychain.serialize().unwrap();

    let rolled_back = Keychain::load_verified("correct-pw", &old_blob, &trusted);
    assert!(matches!(
        rolled_back,
        Err(KeychainError::IntegrityViolation)
    ));

    let current = Keychain::load_verified("correct-pw", &new_blob, &trusted).unwrap();
    assert_eq!(current.get("example.com").unwrap().as_deref(), Some("new"));
}

#[test]
fn empty_store_cannot_detect_wrong_password() {
    let keychain = Keychain::initialize("correct-pw").unwrap();
    let (blob, _) = keychain.serialize().unwrap();

    let mut loaded = Keychain::load("other-pw", &blob).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.get("example.com").unwrap(), None);

    // Entries written under the wrong key are unreadable with the right one.
    loaded.set("example.com", "s3cr3t").unwrap();
    let (blob, _) = loaded.serialize().unwrap();
    assert!(matches!(
        Keychain::load("correct-pw", &blob),
        Err(KeychainError::WrongPassword)
    ));
}

#[test]
fn garbage_blob_is_malformed() {
    for blob in ["", "null", "{\"version\":1}", "{\"salt\": 5}"] {
        assert!(
            matches!(
                Keychain::load("pw", blob),
                Err(KeychainError::Malformed { .. })
            ),
            "accepted: {blob}"
        );
    }
}

#[test]
fn long_values_survive_serialize_and_load() {
    let passphrase = "staple battery horse correct ".repeat(3);
    let emoji = "🔐".repeat(17);
    let mut keychain = Keychain::initialize("correct-pw").unwrap();
    keychain.set("long.com", &passphrase).unwrap();
    keychain.set("emoji.com", &emoji).unwrap();
    let (blob, _) = keychain.serialize().unwrap();

    let loaded = Keychain::load("correct-pw", &blob).unwrap();
    assert_eq!(loaded.get("long.com").unwrap(), Some(passphrase));
    assert_eq!(loaded.get("emoji.com").unwrap(), Some(emoji));
}

// ═══════════════════════════════════════════════════════════════════════
//  Determinism properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn key_derivation_and_lookup_are_deterministic() {
    let salt = [42u8; SALT_LEN];
    let first = crypto::derive_keys("pw", &salt);
    let second = crypto::derive_keys("pw", &salt);
    assert_eq!(first, second);

    let key = first.encryption_key();
    assert_eq!(
        lookup_key_for(key, "example.com").unwrap(),
        lookup_key_for(second.encryption_key(), "example.com").unwrap()
    );
    assert_ne!(
        lookup_key_for(key, "a").unwrap(),
        lookup_key_for(key, "b").unwrap()
    );
}

#[test]
fn checksum_independent_of_insertion_order() {
    let mut forward = Keychain::initialize("pw").unwrap();
    for name in ["a.com", "b.com", "c.com"] {
        forward.set(name, "v").unwrap();
    }
    let (blob, _) = forward.serialize().unwrap();
    let decoded = format::decode(&blob).unwrap();

    let mut pairs: Vec<_> = decoded.entries.iter().collect();
    let sorted = integrity::compute_checksum(pairs.iter().copied()).unwrap();
    pairs.reverse();
    let reversed = integrity::compute_checksum(pairs.iter().copied()).unwrap();

    assert_eq!(sorted, reversed);
    assert_eq!(sorted, decoded.checksum);
}

// ═══════════════════════════════════════════════════════════════════════
//  Shared handle over a file store
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shared_keychain_persists_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keychain.json");

    let shared = SharedKeychain::create("correct-pw", Arc::new(FileSnapshotStore::new(&path)))
        .await
        .unwrap();
    shared.set("example.com", "s3cr3t").await.unwrap();
    shared.set("mail.org", "hunter2").await.unwrap();
    assert!(shared.remove("mail.org").await.unwrap());
    drop(shared);

    let reopened = SharedKeychain::open("correct-pw", Arc::new(FileSnapshotStore::new(&path)))
        .await
        .unwrap();
    assert_eq!(reopened.names().await.unwrap(), vec!["example.com"]);

    let wrong = SharedKeychain::open("other-pw", Arc::new(FileSnapshotStore::new(&path))).await;
    assert!(matches!(wrong, Err(KeychainError::WrongPassword)));
}

#[tokio::test]
async fn stale_sidecar_checksum_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keychain.json");
    let store = FileSnapshotStore::new(&path);

    let shared = SharedKeychain::create("correct-pw", Arc::new(FileSnapshotStore::new(&path)))
        .await
        .unwrap();
    let initial = store.read().unwrap().unwrap();
    shared.set("example.com", "s3cr3t").await.unwrap();

    // Roll the sidecar back to the checksum of the empty store.
    std::fs::write(store.checksum_path(), initial.checksum.to_base64()).unwrap();

    let result = SharedKeychain::open("correct-pw", Arc::new(store)).await;
    assert!(matches!(result, Err(KeychainError::IntegrityViolation)));
}

#[tokio::test]
async fn exported_file_restores_into_new_location() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("keychain.json");
    let backup = dir.path().join("backup/keychain.json");

    let shared = SharedKeychain::create("correct-pw", Arc::new(FileSnapshotStore::new(&live)))
        .await
        .unwrap();
    shared.set("example.com", "s3cr3t").await.unwrap();
    FileSnapshotStore::new(&backup)
        .write(&shared.snapshot().await.unwrap())
        .unwrap();

    let restored_path = dir.path().join("restored.json");
    let blob = std::fs::read_to_string(&backup).unwrap();
    SharedKeychain::restore(
        "correct-pw",
        blob,
        Arc::new(FileSnapshotStore::new(&restored_path)),
    )
    .await
    .unwrap();

    let reopened = SharedKeychain::open(
        "correct-pw",
        Arc::new(FileSnapshotStore::new(&restored_path)),
    )
    .await
    .unwrap();
    assert_eq!(
        reopened.get("example.com").await.unwrap().as_deref(),
        Some("s3cr3t")
    );
}

#[tokio::test]
async fn failed_import_leaves_live_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("keychain.json");
    let store = FileSnapshotStore::new(&live);

    let shared = SharedKeychain::create("correct-pw", Arc::new(FileSnapshotStore::new(&live)))
        .await
        .unwrap();
    shared.set("example.com", "s3cr3t").await.unwrap();
    let before = store.read().unwrap();

    let foreign = keychain_with(&[("other.com", "x")]).serialize().unwrap().0;
    let result = SharedKeychain::restore(
        "other-pw",
        foreign,
        Arc::new(FileSnapshotStore::new(&live)),
    )
    .await;

    assert!(matches!(result, Err(KeychainError::WrongPassword)));
    assert_eq!(store.read().unwrap(), before);
}
