//! Snapshot commands

use anyhow::{Context, Result};
use url::Url;

use crate::config::KeychainConfig;
use crate::fragment;

use super::{open_transfer, print_success, print_warning, Paths};

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).with_context(|| format!("Invalid URL: {}", url))
}

/// Snapshot local state and print `url` with the blob in its fragment.
///
/// Returns the URL to navigate to. It is unchanged when there was nothing to
/// snapshot.
pub fn create(config: &KeychainConfig, paths: &Paths, url: &str) -> Result<Url> {
    let mut url = parse_url(url)?;
    let transfer = open_transfer(config, paths, &url)?;

    match transfer.create().context("Failed to create snapshot")? {
        Some(blob) => {
            fragment::attach(&mut url, &config.snapshot.fragment_key, &blob);
            print_success("Snapshot created.");
            println!(
                "Key cookie expires in {}s.",
                config.snapshot.max_age_secs
            );
        }
        None => print_warning("No keychain state to snapshot."),
    }

    println!("{}", url);
    Ok(url)
}

/// Restore local state from the blob in `url`'s fragment.
///
/// Returns the number of restored entries, or `None` when nothing could be
/// restored yet (no blob, no key cookie, storage unavailable).
pub fn restore(config: &KeychainConfig, paths: &Paths, url: &str) -> Result<Option<usize>> {
    let mut url = parse_url(url)?;
    let Some(blob) = fragment::take(&mut url, &config.snapshot.fragment_key) else {
        print_warning("URL carries no snapshot.");
        return Ok(None);
    };

    let transfer = open_transfer(config, paths, &url)?;
    let grant = transfer
        .request_access()
        .context("Storage access was not granted")?;

    match transfer.restore(&blob, &grant) {
        Ok(applied) => {
            print_success(&format!("Restored {} entries.", applied));
            println!("{}", url);
            Ok(Some(applied))
        }
        Err(e) if e.is_recoverable() => {
            print_warning(&format!("Snapshot not restored: {}", e));
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to restore snapshot"),
    }
}

/// Expire the snapshot key cookie.
pub fn clear(config: &KeychainConfig, paths: &Paths) -> Result<()> {
    let page = parse_url(&config.client.keychain_url)?;
    open_transfer(config, paths, &page)?.clear();
    print_success("Snapshot key cleared.");
    Ok(())
}
