//! Cookie Carrier
//!
//! The snapshot key travels in a short-lived cookie. Cookie stores follow
//! `document.cookie` semantics: writes are `Set-Cookie` style strings and
//! a `Max-Age` of zero or less deletes the cookie.
//!
//! An embedded cross-origin context can only read its unpartitioned cookies
//! after an explicit storage-access grant. Reads therefore require an
//! [`AccessGrant`], which can only be obtained through
//! [`AccessGrant::request`].

use cookie::{time, Cookie, SameSite};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

use crate::storage::write_private;

/// Errors raised by a cookie store.
#[derive(Debug, Error)]
pub enum CookieError {
    /// The cookie string could not be parsed.
    #[error("invalid cookie: {0}")]
    Invalid(String),

    /// The user agent refused unpartitioned cookie access.
    #[error("storage access denied")]
    AccessDenied,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The cookie file could not be read or written.
    #[error("corrupt cookie file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Proof that storage access was granted in this context.
///
/// Cookie reads take a `&AccessGrant`, so code that reads the snapshot key
/// cannot be written without first requesting access.
#[derive(Debug)]
pub struct AccessGrant {
    _private: (),
}

impl AccessGrant {
    /// Request storage access from `store`.
    pub fn request(store: &dyn CookieStore) -> Result<Self, CookieError> {
        store.request_storage_access()?;
        Ok(Self { _private: () })
    }
}

/// A cookie jar as seen from one browsing context.
pub trait CookieStore: Send + Sync {
    /// Apply a `Set-Cookie` style string.
    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError>;

    /// Current value of the cookie called `name`, if present and unexpired.
    fn get_cookie(&self, name: &str, grant: &AccessGrant) -> Option<String>;

    /// Ask the user agent for unpartitioned cookie access.
    fn request_storage_access(&self) -> Result<(), CookieError> {
        Ok(())
    }
}

/// Whether the page runs over HTTPS. Decides the cookie attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// `Secure; SameSite=None`, readable from a cross-site embedded context.
    Https,
    /// `SameSite=Lax` without `Secure`, for plain-HTTP local development.
    Insecure,
}

impl TransportSecurity {
    pub fn for_url(url: &Url) -> Self {
        if url.scheme() == "https" {
            Self::Https
        } else {
            Self::Insecure
        }
    }
}

/// Build the `Set-Cookie` string for a cookie carrying `value`.
pub fn build_cookie(
    name: &str,
    value: &str,
    path: &str,
    max_age: Duration,
    transport: TransportSecurity,
) -> String {
    let max_age = time::Duration::seconds(i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX));
    let builder = Cookie::build((name.to_owned(), value.to_owned()))
        .path(path.to_owned())
        .max_age(max_age);

    let builder = match transport {
        TransportSecurity::Https => builder.secure(true).same_site(SameSite::None),
        TransportSecurity::Insecure => builder.same_site(SameSite::Lax),
    };

    builder.build().to_string()
}

/// Build the `Set-Cookie` string that expires the cookie called `name`.
pub fn expired_cookie(name: &str, path: &str, transport: TransportSecurity) -> String {
    build_cookie(name, "", path, Duration::ZERO, transport)
}

/// The parts of a `Set-Cookie` string a store acts on.
struct CookieWrite {
    name: String,
    value: String,
    max_age_secs: Option<i64>,
}

impl CookieWrite {
    fn parse(cookie: &str) -> Result<Self, CookieError> {
        let parsed =
            Cookie::parse(cookie.to_owned()).map_err(|e| CookieError::Invalid(e.to_string()))?;
        Ok(Self {
            name: parsed.name().to_owned(),
            value: parsed.value().to_owned(),
            max_age_secs: parsed.max_age().map(|d| d.whole_seconds()),
        })
    }

    fn is_deletion(&self) -> bool {
        matches!(self.max_age_secs, Some(secs) if secs <= 0)
    }
}

#[derive(Debug, Clone)]
struct MemoryCookie {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory cookie jar.
#[derive(Debug)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, MemoryCookie>>,
    history: Mutex<Vec<String>>,
    access_allowed: Mutex<bool>,
    #[cfg(test)]
    skew: Mutex<Duration>,
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self {
            cookies: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            access_allowed: Mutex::new(true),
            #[cfg(test)]
            skew: Mutex::new(Duration::ZERO),
        }
    }

    /// A jar whose storage-access requests are refused until
    /// [`allow_storage_access`](Self::allow_storage_access) is called.
    pub fn partitioned() -> Self {
        let store = Self::new();
        *store.access_allowed.lock() = false;
        store
    }

    pub fn allow_storage_access(&self) {
        *self.access_allowed.lock() = true;
    }

    /// Every cookie string written so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    /// Whether a live cookie called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        let now = self.now();
        self.cookies
            .lock()
            .get(name)
            .is_some_and(|c| c.expires_at.map_or(true, |at| at > now))
    }

    #[cfg(test)]
    pub(crate) fn advance(&self, by: Duration) {
        *self.skew.lock() += by;
    }

    #[cfg(test)]
    fn now(&self) -> Instant {
        Instant::now() + *self.skew.lock()
    }

    #[cfg(not(test))]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl CookieStore for MemoryCookieStore {
    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError> {
        let write = CookieWrite::parse(cookie)?;
        self.history.lock().push(cookie.to_owned());

        let mut cookies = self.cookies.lock();
        if write.is_deletion() {
            cookies.remove(&write.name);
            return Ok(());
        }

        let now = self.now();
        // A Max-Age beyond the clock's range never expires.
        let expires_at = write
            .max_age_secs
            .and_then(|secs| now.checked_add(Duration::from_secs(secs.unsigned_abs())));
        cookies.insert(
            write.name,
            MemoryCookie {
                value: write.value,
                expires_at,
            },
        );
        Ok(())
    }

    fn get_cookie(&self, name: &str, _grant: &AccessGrant) -> Option<String> {
        let now = self.now();
        let mut cookies = self.cookies.lock();
        match cookies.get(name) {
            Some(cookie) if cookie.expires_at.is_some_and(|at| at <= now) => {
                cookies.remove(name);
                None
            }
            Some(cookie) => Some(cookie.value.clone()),
            None => None,
        }
    }

    fn request_storage_access(&self) -> Result<(), CookieError> {
        if *self.access_allowed.lock() {
            Ok(())
        } else {
            Err(CookieError::AccessDenied)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileCookie {
    value: String,
    /// Unix timestamp (seconds) after which the cookie is gone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

/// Cookie jar persisted as JSON, used by the CLI to carry the key between
/// invocations.
#[derive(Debug)]
pub struct FileCookieStore {
    path: PathBuf,
    cookies: Mutex<HashMap<String, FileCookie>>,
}

impl FileCookieStore {
    pub fn open(path: &Path) -> Result<Self, CookieError> {
        let cookies = if path.exists() {
            let json = fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            cookies: Mutex::new(cookies),
        })
    }

    fn persist(&self, cookies: &HashMap<String, FileCookie>) -> Result<(), CookieError> {
        let json = serde_json::to_string_pretty(cookies)?;
        write_private(&self.path, json.as_bytes())?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CookieStore for FileCookieStore {
    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError> {
        let write = CookieWrite::parse(cookie)?;
        let mut cookies = self.cookies.lock();

        if write.is_deletion() {
            if cookies.remove(&write.name).is_some() {
                self.persist(&cookies)?;
            }
            return Ok(());
        }

        let expires_at = write
            .max_age_secs
            .map(|secs| unix_now().saturating_add(secs.unsigned_abs()));
        cookies.insert(
            write.name,
            FileCookie {
                value: write.value,
                expires_at,
            },
        );
        self.persist(&cookies)
    }

    fn get_cookie(&self, name: &str, _grant: &AccessGrant) -> Option<String> {
        let cookies = self.cookies.lock();
        let cookie = cookies.get(name)?;
        match cookie.expires_at {
            Some(at) if at <= unix_now() => None,
            _ => Some(cookie.value.clone()),
        }
    }
}
