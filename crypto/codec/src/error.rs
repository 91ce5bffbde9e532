//! Errors produced by the snapshot codec.

use displaydoc::Display;

/// Error values for snapshot encoding, key handling and authenticated
/// encryption.
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Required platform crypto primitive is unavailable: {0}
    EnvironmentUnsupported(&'static str),

    /// Invalid key length: expected {expected} bytes, got {got}
    InvalidKeyLength {
        /// Required key length in bytes
        expected: usize,
        /// Length that was supplied
        got: usize,
    },

    /// Authenticated decryption failed
    AuthenticationFailed,

    /// Encryption failed
    EncryptionFailed,

    /// Invalid base64url encoding
    InvalidEncoding,
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type Result<T> = core::result::Result<T, CodecError>;
