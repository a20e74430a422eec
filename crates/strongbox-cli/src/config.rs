//! CLI configuration.
//!
//! Reads the `[keychain]` section from `config/default.toml` (or the file
//! given with `--config`). Missing files, sections and keys fall back to
//! defaults.

use std::path::{Path, PathBuf};

/// Settings loaded from the `[keychain]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeychainConfig {
    /// Location of the keychain blob.
    pub path: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/keychain.json"),
            log_level: "warn".into(),
        }
    }
}

/// Load configuration from `path`, falling back to defaults if the file is
/// missing or unreadable.
pub fn load_config(path: &Path) -> KeychainConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(_) => KeychainConfig::default(),
    }
}

/// Parse configuration text. Invalid TOML yields the defaults.
pub fn parse_config(content: &str) -> KeychainConfig {
    let defaults = KeychainConfig::default();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return defaults,
    };

    let section = match table.get("keychain") {
        Some(toml::Value::Table(s)) => s,
        _ => return defaults,
    };

    KeychainConfig {
        path: section
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.path),
        log_level: section
            .get("log_level")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.log_level),
    }
}
