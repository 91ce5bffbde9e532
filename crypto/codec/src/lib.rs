#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Snapshot codec for the keychain.
//!
//! This crate provides the primitives used to carry a bounded subset of the
//! keychain's local state across a cross-origin redirect:
//!
//! - [`SnapshotKey`]: a fresh 256-bit AES-GCM key per snapshot, exportable to
//!   raw bytes so it can travel in a cookie
//! - [`encrypt`] / [`decrypt`]: authenticated encryption producing a URL-safe
//!   blob of `IV || ciphertext || tag`
//! - [`base64url_encode`] / [`base64url_decode`]: the URL-safe encoding used
//!   for both carriers
//!
//! # Example
//!
//! ```rust
//! use kc_crypto_codec::{decrypt, encrypt, SnapshotKey};
//!
//! let key = SnapshotKey::generate().unwrap();
//! let blob = encrypt(b"{\"@cartridge/a\":\"1\"}", &key).unwrap();
//!
//! // The blob is safe to place in a URL fragment.
//! assert!(!blob.contains('+') && !blob.contains('/') && !blob.contains('='));
//!
//! let plaintext = decrypt(&blob, &key).unwrap();
//! assert_eq!(plaintext, b"{\"@cartridge/a\":\"1\"}");
//! ```
//!
//! # Blob Layout
//!
//! | Component | Size |
//! |-----------|------|
//! | IV | 12 bytes |
//! | Ciphertext | len(plaintext) |
//! | Authentication tag | 16 bytes |

mod cipher;
mod encoding;
mod error;
mod key;

pub use cipher::{decrypt, encrypt, encrypt_with_rng, IV_LEN, TAG_LEN};
pub use encoding::{base64url_decode, base64url_encode};
pub use error::{CodecError, Result};
pub use key::{SnapshotKey, KEY_LEN};
