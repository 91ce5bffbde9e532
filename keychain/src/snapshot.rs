//! Snapshot Transfer
//!
//! Carries the keychain's namespaced local state across a cross-origin
//! redirect using a split-key scheme:
//! - The state is encrypted with a fresh AES-256-GCM key
//! - The ciphertext travels in a URL fragment (never sent to a server)
//! - The key travels in a short-lived cookie scoped to the keychain
//!
//! Neither carrier alone reveals or reconstructs the state, tampering with
//! either is detected by authenticated decryption, and the cookie's
//! `Max-Age` bounds how long the pair is usable no matter how long the URL
//! lingers.
//!
//! Concurrent snapshots for the same cookie name are last-writer-wins: a
//! second `create()` replaces the key cookie, and the first blob can no
//! longer be restored.

use kc_crypto_codec::{base64url_decode, base64url_encode, decrypt, encrypt, CodecError, SnapshotKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::cookie::{build_cookie, expired_cookie, AccessGrant, CookieError, CookieStore, TransportSecurity};
use crate::storage::{LocalStorage, StorageError};

/// Default namespace prefix of participating keys.
pub const DEFAULT_KEY_PREFIX: &str = "@cartridge/";

/// Default name of the key cookie.
pub const DEFAULT_COOKIE_NAME: &str = "keychain_snapshot_key";

/// Default lifetime of the key cookie.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Namespaced key -> value, where `None` means "delete on restore".
pub type Snapshot = BTreeMap<String, Option<String>>;

/// Errors raised while creating or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Local storage cannot be used in this context.
    #[error("local storage unavailable")]
    StorageUnavailable,

    /// No ciphertext was supplied.
    #[error("snapshot blob is empty")]
    EmptyBlob,

    /// The key cookie is absent, expired, or not yet readable.
    #[error("snapshot key cookie not found")]
    MissingKeyCookie,

    /// Key handling or authenticated encryption failed.
    #[error("snapshot crypto error: {0}")]
    Codec(#[from] CodecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// The decrypted snapshot is not a string map.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Whether retrying later (typically after obtaining storage access) may
    /// succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable | Self::EmptyBlob | Self::MissingKeyCookie
        )
    }
}

/// Tunables for [`SnapshotTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub key_prefix: String,
    pub cookie_name: String,
    pub cookie_path: String,
    pub max_age: Duration,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl From<&SnapshotConfig> for SnapshotOptions {
    fn from(config: &SnapshotConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            cookie_name: config.cookie_name.clone(),
            cookie_path: config.cookie_path.clone(),
            max_age: Duration::from_secs(config.max_age_secs),
        }
    }
}

/// Creates and restores encrypted snapshots of namespaced local state.
pub struct SnapshotTransfer {
    storage: Arc<dyn LocalStorage>,
    cookies: Arc<dyn CookieStore>,
    transport: TransportSecurity,
    options: SnapshotOptions,
}

impl SnapshotTransfer {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        cookies: Arc<dyn CookieStore>,
        transport: TransportSecurity,
    ) -> Self {
        Self::with_options(storage, cookies, transport, SnapshotOptions::default())
    }

    pub fn with_options(
        storage: Arc<dyn LocalStorage>,
        cookies: Arc<dyn CookieStore>,
        transport: TransportSecurity,
        options: SnapshotOptions,
    ) -> Self {
        Self {
            storage,
            cookies,
            transport,
            options,
        }
    }

    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    /// Request the storage-access grant needed by [`restore`](Self::restore).
    pub fn request_access(&self) -> Result<AccessGrant, CookieError> {
        AccessGrant::request(self.cookies.as_ref())
    }

    /// Collect every key under the prefix.
    pub fn collect(&self) -> Result<Snapshot, SnapshotError> {
        if !self.storage.is_available() {
            return Err(SnapshotError::StorageUnavailable);
        }

        let mut snapshot = Snapshot::new();
        for key in self.storage.keys()? {
            if key.starts_with(&self.options.key_prefix) {
                let value = self.storage.get_item(&key)?;
                snapshot.insert(key, value);
            }
        }
        Ok(snapshot)
    }

    /// Encrypt the namespaced state and plant the key cookie.
    ///
    /// Returns the blob to carry in the outgoing URL's fragment, or `None`
    /// (with no cookie set) when there is nothing to carry.
    pub fn create(&self) -> Result<Option<String>, SnapshotError> {
        let snapshot = self.collect()?;
        if snapshot.is_empty() {
            debug!("no namespaced state to snapshot");
            return Ok(None);
        }

        let key = SnapshotKey::generate()?;
        let plaintext = serde_json::to_vec(&snapshot)?;
        let blob = encrypt(&plaintext, &key)?;

        let cookie = build_cookie(
            &self.options.cookie_name,
            &base64url_encode(&key.export()),
            &self.options.cookie_path,
            self.options.max_age,
            self.transport,
        );
        self.cookies.set_cookie(&cookie)?;

        info!(
            entries = snapshot.len(),
            max_age_secs = self.options.max_age.as_secs(),
            "snapshot created"
        );
        Ok(Some(blob))
    }

    /// Decrypt `blob` with the key cookie and apply it to local storage.
    ///
    /// Nothing is written unless decryption fully succeeds. Entries with a
    /// null value delete their key. On success the key cookie is cleared and
    /// the number of applied entries is returned.
    ///
    /// A storage failure while applying leaves the entries before it written
    /// and the key cookie in place; retrying with the same blob completes the
    /// restore.
    ///
    /// Missing carriers and unavailable storage are logged and returned as
    /// recoverable errors without touching state.
    pub fn restore(&self, blob: &str, grant: &AccessGrant) -> Result<usize, SnapshotError> {
        if !self.storage.is_available() {
            warn!("cannot restore snapshot: local storage unavailable");
            return Err(SnapshotError::StorageUnavailable);
        }
        if blob.is_empty() {
            warn!("cannot restore snapshot: empty blob");
            return Err(SnapshotError::EmptyBlob);
        }
        let Some(encoded_key) = self.cookies.get_cookie(&self.options.cookie_name, grant) else {
            warn!(
                cookie = %self.options.cookie_name,
                "cannot restore snapshot: key cookie not found"
            );
            return Err(SnapshotError::MissingKeyCookie);
        };

        let key = SnapshotKey::import(&base64url_decode(&encoded_key)?)?;
        let plaintext = decrypt(blob, &key)?;
        let snapshot: Snapshot = serde_json::from_slice(&plaintext)?;

        let entries: Vec<(&String, &Option<String>)> = snapshot
            .iter()
            .filter(|(key, _)| {
                let inside = key.starts_with(&self.options.key_prefix);
                if !inside {
                    warn!(%key, "skipping snapshot entry outside namespace");
                }
                inside
            })
            .collect();

        // Applying is idempotent. If storage fails part-way the cookie is
        // kept, so the same blob can be restored again.
        for (key, value) in &entries {
            let written = match value {
                Some(value) => self.storage.set_item(key, value),
                None => self.storage.remove_item(key),
            };
            if let Err(e) = written {
                warn!(%key, "snapshot partially applied: {}", e);
                return Err(e.into());
            }
        }

        let applied = entries.len();
        self.clear();
        info!(entries = applied, "snapshot restored");
        Ok(applied)
    }

    /// Expire the key cookie. Safe to call at any time, any number of times.
    pub fn clear(&self) {
        let cookie = expired_cookie(
            &self.options.cookie_name,
            &self.options.cookie_path,
            self.transport,
        );
        if let Err(e) = self.cookies.set_cookie(&cookie) {
            warn!("failed to clear snapshot key cookie: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::MemoryCookieStore;
    use crate::storage::MemoryStorage;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        cookies: Arc<MemoryCookieStore>,
        transfer: SnapshotTransfer,
    }

    fn fixture(storage: MemoryStorage, transport: TransportSecurity) -> Fixture {
        let storage = Arc::new(storage);
        let cookies = Arc::new(MemoryCookieStore::new());
        let transfer = SnapshotTransfer::new(storage.clone(), cookies.clone(), transport);
        Fixture {
            storage,
            cookies,
            transfer,
        }
    }

    #[test]
    fn test_collect_filters_by_prefix() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1"), ("other", "2")]),
            TransportSecurity::Https,
        );
        let snapshot = f.transfer.collect().unwrap();
        assert_eq!(
            snapshot,
            Snapshot::from([("@cartridge/a".to_string(), Some("1".to_string()))])
        );
    }

    #[test]
    fn test_create_empty_is_noop() {
        let f = fixture(
            MemoryStorage::with_items([("other", "2")]),
            TransportSecurity::Https,
        );
        assert_eq!(f.transfer.create().unwrap(), None);
        assert!(f.cookies.history().is_empty());
    }

    #[test]
    fn test_create_sets_https_cookie() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        let blob = f.transfer.create().unwrap().unwrap();
        assert!(!blob.is_empty());

        let history = f.cookies.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].starts_with("keychain_snapshot_key="));
        assert!(history[0].contains("Secure"));
        assert!(history[0].contains("SameSite=None"));
        assert!(history[0].contains("Max-Age=300"));
    }

    #[test]
    fn test_create_sets_lax_cookie_over_http() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Insecure,
        );
        f.transfer.create().unwrap().unwrap();

        let history = f.cookies.history();
        assert!(history[0].contains("SameSite=Lax"));
        assert!(!history[0].contains("Secure"));
    }

    #[test]
    fn test_blob_does_not_contain_plaintext() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/session", "very-secret-session")]),
            TransportSecurity::Https,
        );
        let blob = f.transfer.create().unwrap().unwrap();
        assert!(!blob.contains("very-secret-session"));
        assert!(!blob.contains("@cartridge"));
    }

    #[test]
    fn test_restore_roundtrip_into_fresh_storage() {
        let source = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1"), ("@cartridge/b", "2"), ("x", "3")]),
            TransportSecurity::Https,
        );
        let blob = source.transfer.create().unwrap().unwrap();

        // Same cookie jar, different storage partition.
        let target_storage = Arc::new(MemoryStorage::new());
        let target = SnapshotTransfer::new(
            target_storage.clone(),
            source.cookies.clone(),
            TransportSecurity::Https,
        );
        let grant = target.request_access().unwrap();
        assert_eq!(target.restore(&blob, &grant).unwrap(), 2);

        assert_eq!(
            target_storage.snapshot(),
            BTreeMap::from([
                ("@cartridge/a".to_string(), "1".to_string()),
                ("@cartridge/b".to_string(), "2".to_string()),
            ])
        );
        assert!(!source.cookies.contains(DEFAULT_COOKIE_NAME));
    }

    #[test]
    fn test_restore_null_deletes_key() {
        let key = SnapshotKey::generate().unwrap();
        let snapshot = Snapshot::from([
            ("@cartridge/x".to_string(), None),
            ("@cartridge/y".to_string(), None),
        ]);
        let blob = encrypt(&serde_json::to_vec(&snapshot).unwrap(), &key).unwrap();

        let f = fixture(
            MemoryStorage::with_items([("@cartridge/x", "old"), ("keep", "1")]),
            TransportSecurity::Https,
        );
        f.cookies
            .set_cookie(&build_cookie(
                DEFAULT_COOKIE_NAME,
                &base64url_encode(&key.export()),
                "/",
                DEFAULT_MAX_AGE,
                TransportSecurity::Https,
            ))
            .unwrap();

        let grant = f.transfer.request_access().unwrap();
        assert_eq!(f.transfer.restore(&blob, &grant).unwrap(), 2);
        assert_eq!(
            f.storage.snapshot(),
            BTreeMap::from([("keep".to_string(), "1".to_string())])
        );
    }

    #[test]
    fn test_restore_without_cookie_is_recoverable() {
        let source = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        let blob = source.transfer.create().unwrap().unwrap();

        let other = fixture(MemoryStorage::new(), TransportSecurity::Https);
        let grant = other.transfer.request_access().unwrap();
        let err = other.transfer.restore(&blob, &grant).unwrap_err();

        assert!(matches!(err, SnapshotError::MissingKeyCookie));
        assert!(err.is_recoverable());
        assert!(other.storage.snapshot().is_empty());
    }

    #[test]
    fn test_restore_empty_blob_is_recoverable() {
        let f = fixture(MemoryStorage::new(), TransportSecurity::Https);
        let grant = f.transfer.request_access().unwrap();
        let err = f.transfer.restore("", &grant).unwrap_err();
        assert!(matches!(err, SnapshotError::EmptyBlob));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_restore_storage_unavailable() {
        let f = fixture(MemoryStorage::unavailable(), TransportSecurity::Https);
        let grant = f.transfer.request_access().unwrap();
        let err = f.transfer.restore("abc", &grant).unwrap_err();
        assert!(matches!(err, SnapshotError::StorageUnavailable));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_restore_tampered_blob_mutates_nothing() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        let blob = f.transfer.create().unwrap().unwrap();
        f.storage.set_item("@cartridge/a", "changed").unwrap();

        let mut raw = base64url_decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = base64url_encode(&raw);

        let grant = f.transfer.request_access().unwrap();
        let err = f.transfer.restore(&tampered, &grant).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Codec(CodecError::AuthenticationFailed)
        ));
        assert!(!err.is_recoverable());
        assert_eq!(
            f.storage.get_item("@cartridge/a").unwrap().as_deref(),
            Some("changed")
        );
        // The key survives a failed attempt until its TTL runs out.
        assert!(f.cookies.contains(DEFAULT_COOKIE_NAME));
    }

    #[test]
    fn test_restore_after_ttl_expiry_fails() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        let blob = f.transfer.create().unwrap().unwrap();
        f.cookies.advance(DEFAULT_MAX_AGE + Duration::from_secs(1));

        let grant = f.transfer.request_access().unwrap();
        assert!(matches!(
            f.transfer.restore(&blob, &grant),
            Err(SnapshotError::MissingKeyCookie)
        ));
    }

    #[test]
    fn test_second_snapshot_wins() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        let first = f.transfer.create().unwrap().unwrap();
        let second = f.transfer.create().unwrap().unwrap();

        let grant = f.transfer.request_access().unwrap();
        assert!(matches!(
            f.transfer.restore(&first, &grant),
            Err(SnapshotError::Codec(CodecError::AuthenticationFailed))
        ));
        assert_eq!(f.transfer.restore(&second, &grant).unwrap(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let f = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1")]),
            TransportSecurity::Https,
        );
        f.transfer.create().unwrap();
        f.transfer.clear();
        f.transfer.clear();

        assert!(!f.cookies.contains(DEFAULT_COOKIE_NAME));
        let history = f.cookies.history();
        assert_eq!(history.len(), 3);
        assert!(history[1].contains("Max-Age=0"));
        assert!(history[2].contains("Max-Age=0"));
    }

    /// Storage that refuses writes to one key until told otherwise.
    struct FailingStorage {
        inner: MemoryStorage,
        failing_key: &'static str,
        failing: parking_lot::Mutex<bool>,
    }

    impl LocalStorage for FailingStorage {
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }

        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.failing_key && *self.failing.lock() {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn test_storage_failure_keeps_key_for_retry() {
        let source = fixture(
            MemoryStorage::with_items([("@cartridge/a", "1"), ("@cartridge/b", "2")]),
            TransportSecurity::Https,
        );
        let blob = source.transfer.create().unwrap().unwrap();

        let storage = Arc::new(FailingStorage {
            inner: MemoryStorage::new(),
            failing_key: "@cartridge/b",
            failing: parking_lot::Mutex::new(true),
        });
        let target = SnapshotTransfer::new(
            storage.clone(),
            source.cookies.clone(),
            TransportSecurity::Https,
        );
        let grant = target.request_access().unwrap();

        let err = target.restore(&blob, &grant).unwrap_err();
        assert!(matches!(err, SnapshotError::Storage(StorageError::Io(_))));
        assert!(source.cookies.contains(DEFAULT_COOKIE_NAME));

        *storage.failing.lock() = false;
        assert_eq!(target.restore(&blob, &grant).unwrap(), 2);
        assert_eq!(storage.inner.snapshot().len(), 2);
        assert!(!source.cookies.contains(DEFAULT_COOKIE_NAME));
    }

    #[test]
    fn test_huge_max_age_does_not_panic() {
        let storage = Arc::new(MemoryStorage::with_items([("@cartridge/a", "1")]));
        let cookies = Arc::new(MemoryCookieStore::new());
        let transfer = SnapshotTransfer::with_options(
            storage,
            cookies.clone(),
            TransportSecurity::Https,
            SnapshotOptions {
                max_age: Duration::from_secs(u64::MAX),
                ..SnapshotOptions::default()
            },
        );

        let blob = transfer.create().unwrap().unwrap();
        let grant = transfer.request_access().unwrap();
        assert_eq!(transfer.restore(&blob, &grant).unwrap(), 1);
    }

    #[test]
    fn test_custom_options() {
        let storage = Arc::new(MemoryStorage::with_items([("app:a", "1"), ("@cartridge/b", "2")]));
        let cookies = Arc::new(MemoryCookieStore::new());
        let transfer = SnapshotTransfer::with_options(
            storage,
            cookies.clone(),
            TransportSecurity::Https,
            SnapshotOptions {
                key_prefix: "app:".to_string(),
                cookie_name: "kc".to_string(),
                cookie_path: "/wallet".to_string(),
                max_age: Duration::from_secs(60),
            },
        );

        let snapshot = transfer.collect().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("app:a"));

        transfer.create().unwrap().unwrap();
        let history = cookies.history();
        assert!(history[0].starts_with("kc="));
        assert!(history[0].contains("Path=/wallet"));
        assert!(history[0].contains("Max-Age=60"));
    }
}
