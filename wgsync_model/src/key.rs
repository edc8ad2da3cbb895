//! Key material for interfaces and peers.
//!
//! A key is 32 raw bytes. Two textual encodings are in use: base64 in
//! configuration files (44 characters, always ending in `=`) and lowercase
//! hex on the control channel (64 characters). Both are strict about
//! length so that truncated or padded key material is rejected instead of
//! silently accepted.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// Length of a raw key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a base64-encoded key in characters.
pub const KEY_LEN_BASE64: usize = 44;

/// Length of a hex-encoded key in characters.
pub const KEY_LEN_HEX: usize = 64;

/// Result type for key decoding operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors that can occur when decoding textual key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The encoded text has the wrong length for its encoding.
    #[error("invalid {encoding} key length: expected {expected} characters, got {actual}")]
    Length {
        /// Which textual encoding was being decoded.
        encoding: &'static str,
        /// Expected number of characters.
        expected: usize,
        /// Number of characters actually present.
        actual: usize,
    },

    /// The text is not valid base64.
    #[error("invalid base64 key: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The text is not valid hex.
    #[error("invalid hex key: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The decoded data was not exactly 32 bytes.
    #[error("invalid key data: expected 32 bytes, got {0}")]
    RawLength(usize),
}

/// A 32-byte key, compared byte for byte.
///
/// The derived ordering is the unsigned lexicographic ordering of the raw
/// bytes, which is what peer-list reconciliation sorts by.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// The all-zero key. On the control channel a zero key means "unset".
    pub const ZERO: Key = Key([0u8; KEY_LEN]);

    /// Wraps raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Key(bytes)
    }

    /// Borrows the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Returns true if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_LEN]
    }

    /// Decodes the 44-character base64 form used in configuration files.
    pub fn from_base64(s: &str) -> KeyResult<Self> {
        if s.len() != KEY_LEN_BASE64 {
            return Err(KeyError::Length {
                encoding: "base64",
                expected: KEY_LEN_BASE64,
                actual: s.len(),
            });
        }
        let bytes = BASE64.decode(s)?;
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| KeyError::RawLength(bytes.len()))?;
        Ok(Key(raw))
    }

    /// Encodes into the 44-character base64 form.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Decodes the 64-character hex form used on the control channel.
    pub fn from_hex(s: &str) -> KeyResult<Self> {
        if s.len() != KEY_LEN_HEX {
            return Err(KeyError::Length {
                encoding: "hex",
                expected: KEY_LEN_HEX,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s)?;
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| KeyError::RawLength(bytes.len()))?;
        Ok(Key(raw))
    }

    /// Encodes into the lowercase 64-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.to_base64()).finish()
    }
}

impl FromStr for Key {
    type Err = KeyError;

    /// Parses the base64 form, the one humans handle.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_base64(s)
    }
}
