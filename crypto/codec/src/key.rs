//! Per-snapshot symmetric keys.

use core::fmt;

use rand_core::{CryptoRng, OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CodecError, Result};

/// Length of a snapshot key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key protecting exactly one snapshot.
///
/// The key is extractable: [`SnapshotKey::export`] yields the raw bytes that
/// are carried in the key cookie. Key bytes are zeroized when the key is
/// dropped and are never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SnapshotKey([u8; KEY_LEN]);

impl SnapshotKey {
    /// Generate a fresh key from the operating system RNG.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EnvironmentUnsupported`] if the OS RNG is not
    /// available.
    pub fn generate() -> Result<Self> {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a fresh key from the supplied RNG.
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|_| CodecError::EnvironmentUnsupported("secure random number generator"))?;
        Ok(Self(bytes))
    }

    /// Import a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] bytes long.
    pub fn import(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CodecError::InvalidKeyLength {
                expected: KEY_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Export the raw key bytes.
    pub fn export(&self) -> [u8; KEY_LEN] {
        self.0
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SnapshotKey(<redacted>)")
    }
}
