//! CLI Commands
//!
//! Implementation of the keychain CLI commands.

pub mod config;
pub mod snapshot;

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::config::{cookies_path_from_config, storage_path_from_config, KeychainConfig};
use crate::cookie::{FileCookieStore, TransportSecurity};
use crate::snapshot::{SnapshotOptions, SnapshotTransfer};
use crate::storage::FileStorage;

/// Files the CLI operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config: PathBuf,
    pub storage: PathBuf,
    pub cookies: PathBuf,
}

impl Paths {
    /// Paths for `config`, with storage and cookie files next to it unless
    /// overridden.
    pub fn resolve(config: PathBuf, storage: Option<PathBuf>, cookies: Option<PathBuf>) -> Self {
        Self {
            storage: storage.unwrap_or_else(|| storage_path_from_config(&config)),
            cookies: cookies.unwrap_or_else(|| cookies_path_from_config(&config)),
            config,
        }
    }
}

/// Open a snapshot transfer over the file-backed storage and cookie jar.
///
/// Cookie attributes follow the scheme of `page`.
pub fn open_transfer(config: &KeychainConfig, paths: &Paths, page: &Url) -> Result<SnapshotTransfer> {
    let storage = FileStorage::open(&paths.storage)
        .with_context(|| format!("Failed to open storage {}", paths.storage.display()))?;
    let cookies = FileCookieStore::open(&paths.cookies)
        .with_context(|| format!("Failed to open cookie jar {}", paths.cookies.display()))?;

    Ok(SnapshotTransfer::with_options(
        Arc::new(storage),
        Arc::new(cookies),
        TransportSecurity::for_url(page),
        SnapshotOptions::from(&config.snapshot),
    ))
}

/// Load the config at `path`, or defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<KeychainConfig> {
    KeychainConfig::load_or_default(path)
}

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}
