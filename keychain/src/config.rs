use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fragment::DEFAULT_FRAGMENT_KEY;
use crate::snapshot::{DEFAULT_COOKIE_NAME, DEFAULT_KEY_PREFIX, DEFAULT_MAX_AGE};

/// Main configuration for the keychain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Namespace prefix of the local keys carried across a redirect
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Name of the cookie carrying the snapshot key
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Lifetime of the key cookie. Bounds how long a snapshot can be restored.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// URL fragment key carrying the encrypted blob
    #[serde(default = "default_fragment_key")]
    pub fragment_key: String,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

fn default_fragment_key() -> String {
    DEFAULT_FRAGMENT_KEY.to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            cookie_name: default_cookie_name(),
            cookie_path: default_cookie_path(),
            max_age_secs: default_max_age_secs(),
            fragment_key: default_fragment_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the keychain frame
    #[serde(default = "default_keychain_url")]
    pub keychain_url: String,

    #[serde(default = "default_popup_width")]
    pub popup_width: u32,

    #[serde(default = "default_popup_height")]
    pub popup_height: u32,

    /// Deadline for non-interactive requests. Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_deadline_secs: Option<u64>,
}

fn default_keychain_url() -> String {
    "https://x.cartridge.gg".to_string()
}

fn default_popup_width() -> u32 {
    400
}

fn default_popup_height() -> u32 {
    650
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keychain_url: default_keychain_url(),
            popup_width: default_popup_width(),
            popup_height: default_popup_height(),
            request_deadline_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_secs.map(Duration::from_secs)
    }
}

impl KeychainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".keychain"))
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join("config.toml"))
}

/// Local storage file living next to `config_path`.
pub fn storage_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(config_path)
        .join("storage.json")
}

/// Cookie jar file living next to `config_path`.
pub fn cookies_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(config_path)
        .join("cookies.json")
}
