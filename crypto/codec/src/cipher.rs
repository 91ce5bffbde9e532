//! AES-256-GCM encryption of snapshot payloads.
//!
//! Every call to [`encrypt`] draws a fresh random IV; the IV is prepended to
//! the ciphertext so that [`decrypt`] needs nothing but the blob and the key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand_core::{CryptoRng, OsRng, RngCore};

use crate::{
    encoding::{base64url_decode, base64url_encode},
    error::{CodecError, Result},
    key::SnapshotKey,
};

/// Length of the AES-GCM initialization vector in bytes.
pub const IV_LEN: usize = 12;

/// Length of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `data` under `key`, returning base64url(IV || ciphertext || tag).
///
/// # Errors
///
/// Returns [`CodecError::EnvironmentUnsupported`] if no secure RNG is
/// available to draw the IV.
pub fn encrypt(data: &[u8], key: &SnapshotKey) -> Result<String> {
    encrypt_with_rng(data, key, &mut OsRng)
}

/// Encrypt `data` under `key`, drawing the IV from `rng`.
pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
    data: &[u8],
    key: &SnapshotKey,
    rng: &mut R,
) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    rng.try_fill_bytes(&mut iv)
        .map_err(|_| CodecError::EnvironmentUnsupported("secure random number generator"))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), data)
        .map_err(|_| CodecError::EncryptionFailed)?;

    let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
    combined.extend_from_slice(&iv);
    combined.extend_from_slice(&ciphertext);

    Ok(base64url_encode(&combined))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Decryption is all-or-nothing: either the full plaintext is returned or an
/// error is, never a partially verified buffer.
///
/// # Errors
///
/// - [`CodecError::InvalidEncoding`] if `blob` is not base64url
/// - [`CodecError::AuthenticationFailed`] if the decoded blob is shorter than
///   the IV, or the tag does not verify under `key`
pub fn decrypt(blob: &str, key: &SnapshotKey) -> Result<Vec<u8>> {
    let combined = base64url_decode(blob)?;
    if combined.len() < IV_LEN {
        return Err(CodecError::AuthenticationFailed);
    }
    let (iv, ciphertext) = combined.split_at(IV_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CodecError::AuthenticationFailed)
}
