//! Local Key-Value Storage
//!
//! The keychain keeps its per-origin state in a flat string key-value store
//! (the browser's `localStorage`). Only keys under a fixed namespace prefix
//! take part in snapshots.
//!
//! Two backends are provided:
//! - [`MemoryStorage`]: in-process, used by embedders and tests
//! - [`FileStorage`]: a JSON file with owner-only permissions, used by the CLI

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be used in this context.
    #[error("local storage unavailable")]
    Unavailable,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not hold a string map.
    #[error("corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A flat string key-value store with `localStorage` semantics.
pub trait LocalStorage: Send + Sync {
    /// Whether the store can be read and written at all.
    fn is_available(&self) -> bool {
        true
    }

    /// All keys currently present.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage.
#[derive(Debug)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
    available: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            available: true,
        }
    }

    /// Storage seeded with `items`.
    pub fn with_items<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: Mutex::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            available: true,
        }
    }

    /// Storage that refuses every operation, like a context where
    /// `localStorage` is blocked.
    pub fn unavailable() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            available: false,
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.items.lock().clone()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl LocalStorage for MemoryStorage {
    fn is_available(&self) -> bool {
        self.available
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check()?;
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().remove(key);
        Ok(())
    }
}

/// Storage persisted as a JSON object in a single file.
///
/// Every mutation atomically replaces the file. The file is created with
/// `0o600` permissions on unix since it may hold session material.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let items = if path.exists() {
            let json = fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(items)?;
        write_private(&self.path, json.as_bytes())?;
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        items.insert(key.to_owned(), value.to_owned());
        self.persist(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }
}

/// Atomically replace `path` with `contents`, with owner-only permissions.
///
/// The data goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers see either the old or the new file.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}
