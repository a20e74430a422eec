//! CLI argument definitions for strongbox.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// strongbox -- a local encrypted password keychain.
#[derive(Parser)]
#[command(
    name = "strongbox",
    version,
    about = "strongbox -- local encrypted password keychain",
    long_about = "Stores website passwords encrypted under a master password. \
                  The master password is read from STRONGBOX_PASSWORD or, if unset, \
                  prompted for without echo (or read from stdin when it is not a terminal)."
)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Keychain file, overriding `[keychain] path` from the config.
    #[arg(long, short, global = true)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new, empty keychain.
    Init,

    /// Print the password stored for a website.
    Get {
        /// Website name, e.g. example.com.
        name: String,
    },

    /// Store (or replace) the password for a website.
    Set {
        /// Website name, e.g. example.com.
        name: String,
        /// The password. Prompted for when omitted.
        value: Option<String>,
    },

    /// Delete the password for a website.
    Remove {
        /// Website name, e.g. example.com.
        name: String,
    },

    /// List stored website names.
    List,

    /// Unlock the keychain and report whether it is intact.
    Verify,

    /// Write a backup of the keychain (and its checksum file) to a path.
    Export {
        /// Destination file.
        path: PathBuf,
    },

    /// Replace the keychain with a backup, after checking that the backup
    /// opens with the master password.
    Import {
        /// Backup file written by `export`.
        path: PathBuf,
    },
}
