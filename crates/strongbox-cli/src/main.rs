//! CLI entry point for strongbox.
//!
//! This binary provides the `strongbox` command with subcommands for
//! creating a keychain, reading, writing and listing its entries, and
//! exporting or importing backups. It is the only layer that prompts for
//! input or formats messages; all cryptography lives in `strongbox-keychain`.

mod cli;
mod config;
mod helpers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use strongbox_keychain::{FileSnapshotStore, SharedKeychain, SnapshotStore};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{
    friendly, master_password, new_master_password, normalize_name, prompt_secret, require_value,
};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config);
    helpers::init_tracing(&config.log_level);

    let path = cli.file.unwrap_or(config.path);
    info!(path = %path.display(), "using keychain file");

    match cli.command {
        Commands::Init => cmd_init(path).await,
        Commands::Get { name } => cmd_get(path, &name).await,
        Commands::Set { name, value } => cmd_set(path, &name, value).await,
        Commands::Remove { name } => cmd_remove(path, &name).await,
        Commands::List => cmd_list(path).await,
        Commands::Verify => cmd_verify(path).await,
        Commands::Export { path: dest } => cmd_export(path, &dest).await,
        Commands::Import { path: src } => cmd_import(path, &src).await,
    }
}

/// Prompt for the master password and unlock the keychain at `path`.
async fn unlock(path: PathBuf) -> Result<SharedKeychain> {
    let password = master_password()?;
    SharedKeychain::open(&password, Arc::new(FileSnapshotStore::new(path)))
        .await
        .map_err(friendly)
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_init(path: PathBuf) -> Result<()> {
    let password = new_master_password()?;

    SharedKeychain::create(&password, Arc::new(FileSnapshotStore::new(&path)))
        .await
        .map_err(friendly)?;

    println!("Created keychain at {}", path.display());
    Ok(())
}

async fn cmd_get(path: PathBuf, name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    let keychain = unlock(path).await?;

    match keychain.get(name).await.map_err(friendly)? {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => anyhow::bail!("no password stored for {name}"),
    }
}

async fn cmd_set(path: PathBuf, name: &str, value: Option<String>) -> Result<()> {
    let name = normalize_name(name)?;
    let keychain = unlock(path).await?;
    let value = match value {
        Some(v) => v,
        None => prompt_secret(&format!("Password for {name}: "))?,
    };
    let value = require_value(value)?;

    keychain.set(name, &value).await.map_err(friendly)?;
    println!("Stored password for {name}");
    Ok(())
}

async fn cmd_remove(path: PathBuf, name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    let keychain = unlock(path).await?;

    if keychain.remove(name).await.map_err(friendly)? {
        println!("Removed {name}");
    } else {
        println!("No password stored for {name}");
    }
    Ok(())
}

async fn cmd_list(path: PathBuf) -> Result<()> {
    let keychain = unlock(path).await?;

    for name in keychain.names().await.map_err(friendly)? {
        println!("{name}");
    }
    Ok(())
}

async fn cmd_verify(path: PathBuf) -> Result<()> {
    let keychain = unlock(path).await?;
    let snapshot = keychain.snapshot().await.map_err(friendly)?;

    println!("Keychain OK");
    println!("  entries:  {}", keychain.len().await);
    println!("  checksum: {}", snapshot.checksum);
    Ok(())
}

async fn cmd_export(path: PathBuf, dest: &Path) -> Result<()> {
    if dest == path.as_path() {
        anyhow::bail!("backup path must differ from the keychain file");
    }
    let keychain = unlock(path).await?;
    let snapshot = keychain.snapshot().await.map_err(friendly)?;

    let backup = FileSnapshotStore::new(dest);
    tokio::task::spawn_blocking(move || backup.write(&snapshot))
        .await
        .context("backup task failed")?
        .map_err(friendly)?;

    println!("Exported {} entries to {}", keychain.len().await, dest.display());
    Ok(())
}

async fn cmd_import(path: PathBuf, src: &Path) -> Result<()> {
    let blob = std::fs::read_to_string(src)
        .with_context(|| format!("failed to read backup {}", src.display()))?;
    let password = master_password()?;

    let keychain = SharedKeychain::restore(&password, blob, Arc::new(FileSnapshotStore::new(&path)))
        .await
        .map_err(friendly)?;

    println!(
        "Imported {} entries into {}",
        keychain.len().await,
        path.display()
    );
    Ok(())
}
