//! URL-safe base64 without padding.
//!
//! Both carriers of a snapshot (the URL fragment and the key cookie) use this
//! encoding. Decoding accepts input with or without trailing `=` so that
//! values which passed through a padding-adding intermediary still decode.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

use crate::error::{CodecError, Result};

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes with the URL-safe alphabet, omitting padding.
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(bytes)
}

/// Decode a URL-safe base64 string, padded or not.
pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(encoded.trim())
        .map_err(|_| CodecError::InvalidEncoding)
}
