//! Config commands

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::KeychainConfig;

use super::{print_error, print_success, prompt_confirm};

/// Write a default config to `path`.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_error("Config already exists at this location");
        println!("Path: {}", path.display());

        if !prompt_confirm("Overwrite existing config?")? {
            println!("Aborted.");
            return Ok(());
        }
    }

    KeychainConfig::default().save(path)?;
    print_success("Config created.");
    println!("Config saved to: {}", path.display());
    Ok(())
}

/// Print the effective config for `path`.
pub fn show(path: &Path) -> Result<()> {
    let config = KeychainConfig::load_or_default(path)?;
    let contents = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("# {}", path.display());
    print!("{}", contents);
    Ok(())
}
