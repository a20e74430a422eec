//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, password prompts, input validation, and
//! the translation of keychain errors into user-facing messages.

use std::io::{self, BufRead, IsTerminal};

use anyhow::{Context, Result, bail};
use strongbox_keychain::KeychainError;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the master password.
pub const PASSWORD_ENV: &str = "STRONGBOX_PASSWORD";

/// Optional confirmation of [`PASSWORD_ENV`] when creating a keychain.
pub const PASSWORD_CONFIRM_ENV: &str = "STRONGBOX_PASSWORD_CONFIRM";

/// Shortest master password accepted for a new keychain.
pub const MIN_PASSWORD_LEN: usize = 6;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so that `get` output on stdout stays clean.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Read a non-empty environment variable, returning `None` if unset or empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Prompt on stderr and read one line from `input`.
pub fn read_secret(input: &mut impl BufRead, prompt: &str) -> Result<String> {
    rpassword::prompt_password_from_bufread(input, &mut io::stderr(), prompt)
        .context("failed to read input")
}

/// Prompt for a secret without echoing it.
///
/// When stdin is not a terminal the secret is read from stdin instead, so
/// scripts can pipe it in.
pub fn prompt_secret(prompt: &str) -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        rpassword::prompt_password(prompt).context("failed to read password")
    } else {
        read_secret(&mut stdin.lock(), prompt)
    }
}

/// The master password from the environment, or else prompted for.
pub fn master_password() -> Result<String> {
    if let Some(password) = env_non_empty(PASSWORD_ENV) {
        return Ok(password);
    }
    let password = prompt_secret("Master password: ")?;
    if password.is_empty() {
        bail!("master password must not be empty");
    }
    Ok(password)
}

/// The master password for a new keychain, entered twice.
///
/// With [`PASSWORD_ENV`] set, [`PASSWORD_CONFIRM_ENV`] is compared against it
/// when present.
pub fn new_master_password() -> Result<String> {
    if let Some(password) = env_non_empty(PASSWORD_ENV) {
        let confirmation = env_non_empty(PASSWORD_CONFIRM_ENV).unwrap_or_else(|| password.clone());
        check_new_password(&password, &confirmation)?;
        return Ok(password);
    }

    let password = prompt_secret("New master password: ")?;
    let confirmation = prompt_secret("Confirm master password: ")?;
    check_new_password(&password, &confirmation)?;
    Ok(password)
}

/// Reject master passwords that are too short or were mistyped.
pub fn check_new_password(password: &str, confirmation: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("master password must be at least {MIN_PASSWORD_LEN} characters");
    }
    if password != confirmation {
        bail!("passwords do not match");
    }
    Ok(())
}

/// Trim surrounding whitespace from a website name.
pub fn normalize_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("website name must not be empty");
    }
    Ok(name)
}

/// Reject an empty password value.
pub fn require_value(value: String) -> Result<String> {
    if value.is_empty() {
        bail!("password must not be empty");
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

/// Translate a keychain error into a message for the user.
pub fn describe(err: &KeychainError) -> String {
    match err {
        KeychainError::WrongPassword => "wrong master password".into(),
        KeychainError::IntegrityViolation => {
            "keychain file is corrupted or has been tampered with; refusing to open it".into()
        }
        KeychainError::Malformed { reason } => {
            format!("keychain file is not a valid keychain ({reason})")
        }
        KeychainError::NotInitialized => {
            "no keychain found; run `strongbox init` first".into()
        }
        KeychainError::AlreadyInitialized => {
            "a keychain already exists at this location".into()
        }
        KeychainError::DecryptionFailed { .. } => {
            "this entry is damaged and cannot be decrypted".into()
        }
        other => other.to_string(),
    }
}

/// Convert a keychain error into an `anyhow` error carrying the user-facing
/// message.
pub fn friendly(err: KeychainError) -> anyhow::Error {
    anyhow::anyhow!(describe(&err))
}
